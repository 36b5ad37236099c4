//! End-to-end downloads over real HTTP against a local mock server.

mod common;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use batch_dl::{Config, DownloadError, Error, NetworkErrorKind, TaskStatus};
use common::{create_downloader, payload, test_config};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_downloads_body_to_destination() {
    let server = MockServer::start().await;
    let body = payload(64 * 1024);
    Mock::given(method("GET"))
        .and(path("/images/cat.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let (downloader, temp_dir) = create_downloader(test_config(2));
    let destination = temp_dir.path().join("cat.jpg");
    downloader
        .add_task(&format!("{}/images/cat.jpg", server.uri()), destination.clone())
        .await
        .unwrap();

    let stats = downloader.run().await.unwrap();

    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.total_bytes, body.len() as u64);
    assert_eq!(std::fs::read(&destination).unwrap(), body);

    let task = &downloader.tasks().await[0];
    assert_eq!(task.status, TaskStatus::Succeeded);
    assert_eq!(task.bytes_transferred, body.len() as u64);
}

#[tokio::test]
async fn test_not_found_leaves_no_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing.jpg"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not here"))
        .mount(&server)
        .await;

    let (downloader, temp_dir) = create_downloader(test_config(1));
    let destination = temp_dir.path().join("missing.jpg");
    downloader
        .add_task(&format!("{}/missing.jpg", server.uri()), destination.clone())
        .await
        .unwrap();

    let stats = downloader.run().await.unwrap();

    assert_eq!(stats.failed, 1);
    assert_eq!(stats.total_bytes, 0);
    assert!(!destination.exists());
    let task = &downloader.tasks().await[0];
    assert_eq!(task.error, Some(DownloadError::HttpStatus { code: 404 }));
}

#[tokio::test]
async fn test_slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow.jpg"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(payload(16))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let config = Config {
        task_timeout: Duration::from_millis(300),
        ..test_config(1)
    };
    let (downloader, temp_dir) = create_downloader(config);
    let destination = temp_dir.path().join("slow.jpg");
    downloader
        .add_task(&format!("{}/slow.jpg", server.uri()), destination.clone())
        .await
        .unwrap();

    let started = Instant::now();
    let stats = downloader.run().await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(stats.failed, 1);
    let task = &downloader.tasks().await[0];
    assert!(task.error.as_ref().is_some_and(DownloadError::is_timeout));
    assert!(!destination.exists());
}

#[tokio::test]
async fn test_mixed_batch_reports_each_outcome() {
    let server = MockServer::start().await;
    for (name, status) in [("a", 200), ("b", 200), ("c", 500), ("d", 200), ("e", 403)] {
        Mock::given(method("GET"))
            .and(path(format!("/{}.jpg", name)))
            .respond_with(ResponseTemplate::new(status).set_body_bytes(payload(100)))
            .expect(1)
            .mount(&server)
            .await;
    }

    let (downloader, temp_dir) = create_downloader(test_config(2));
    for name in ["a", "b", "c", "d", "e"] {
        downloader
            .add_task(
                &format!("{}/{}.jpg", server.uri(), name),
                temp_dir.path().join(format!("{}.jpg", name)),
            )
            .await
            .unwrap();
    }

    let stats = downloader.run().await.unwrap();

    assert_eq!(stats.total_tasks, 5);
    assert_eq!(stats.succeeded, 3);
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.total_bytes, 300);

    let failed_codes: Vec<u16> = downloader
        .tasks()
        .await
        .iter()
        .filter_map(|t| t.error.as_ref().and_then(DownloadError::status_code))
        .collect();
    assert_eq!(failed_codes, vec![500, 403]);
}

#[tokio::test]
async fn test_default_and_task_headers_reach_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/protected.jpg"))
        .and(header("user-agent", "integration-agent"))
        .and(header("accept", "image/png"))
        .and(header("referer", "https://gallery.test/post/1"))
        .and(header("x-api-key", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload(10)))
        .mount(&server)
        .await;

    let mut default_headers = HashMap::new();
    default_headers.insert("X-Api-Key".to_string(), "secret".to_string());
    default_headers.insert("Referer".to_string(), "https://default.test/".to_string());
    let config = Config {
        user_agent: "integration-agent".to_string(),
        accept: "image/png".to_string(),
        default_headers,
        ..test_config(1)
    };
    let (downloader, temp_dir) = create_downloader(config);

    let mut task_headers = HashMap::new();
    task_headers.insert(
        "Referer".to_string(),
        "https://gallery.test/post/1".to_string(),
    );
    downloader
        .add_task_with_headers(
            &format!("{}/protected.jpg", server.uri()),
            temp_dir.path().join("protected.jpg"),
            &task_headers,
        )
        .await
        .unwrap();

    let stats = downloader.run().await.unwrap();

    // unmatched requests get wiremock's default 404
    assert_eq!(stats.succeeded, 1, "{:?}", downloader.tasks().await[0].error);
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    // reserve a port, then free it so nothing is listening
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let (downloader, temp_dir) = create_downloader(test_config(1));
    let destination = temp_dir.path().join("refused.jpg");
    downloader
        .add_task(&format!("http://127.0.0.1:{}/x.jpg", port), destination.clone())
        .await
        .unwrap();

    let stats = downloader.run().await.unwrap();

    assert_eq!(stats.failed, 1);
    assert!(!destination.exists());
    let task = &downloader.tasks().await[0];
    assert!(
        matches!(
            task.error,
            Some(DownloadError::Network {
                kind: NetworkErrorKind::Connect,
                ..
            })
        ),
        "unexpected error: {:?}",
        task.error
    );
}

#[tokio::test]
async fn test_invalid_url_is_rejected_before_running() {
    let (downloader, temp_dir) = create_downloader(test_config(1));

    let result = downloader
        .add_task("definitely not a url", temp_dir.path().join("x"))
        .await;

    assert!(matches!(result, Err(Error::InvalidInput(_))));
    let stats = downloader.run().await.unwrap();
    assert_eq!(stats.total_tasks, 0);
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let config = Config {
        max_concurrency: 0,
        ..test_config(1)
    };
    let result = batch_dl::BatchDownloader::new(config);
    assert!(matches!(result, Err(Error::Config { .. })));
}

#[tokio::test]
async fn test_statistics_row_appended_after_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/one.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload(1024)))
        .mount(&server)
        .await;

    let (downloader, temp_dir) = create_downloader(test_config(1));
    downloader
        .add_task(
            &format!("{}/one.jpg", server.uri()),
            temp_dir.path().join("one.jpg"),
        )
        .await
        .unwrap();
    let stats = downloader.run().await.unwrap();

    let table = temp_dir.path().join("statistic.md");
    batch_dl::report::append_statistics_row(&table, &stats)
        .await
        .unwrap();

    let content = std::fs::read_to_string(&table).unwrap();
    assert_eq!(content.lines().count(), 3);
    assert!(content.lines().nth(2).unwrap().starts_with("| 1 | 1 | 0 |"));
    assert_eq!(batch_dl::report::log_failures(&downloader.tasks().await), 0);
}
