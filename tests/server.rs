//! HTTP API tests. The server runs in-process with a page extractor that
//! splits on form feeds, so fixtures are plain byte strings.

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use pyp_archive::config::Config;
use pyp_archive::extract::{ExtractError, PageExtractor};
use pyp_archive::server::run_server_with_extractor;

struct FormFeedPages;

impl PageExtractor for FormFeedPages {
    fn pages(&self, bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
        let text = std::str::from_utf8(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))?;
        if text.contains("CORRUPT") {
            return Err(ExtractError::Pdf("bad xref".to_string()));
        }
        Ok(text.split('\x0c').map(str::to_string).collect())
    }
}

fn find_free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(base: &str) {
    let client = reqwest::Client::new();
    for _ in 0..50 {
        if client.get(format!("{}/health", base)).send().await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("server did not start at {}", base);
}

struct TestServer {
    _tmp: TempDir,
    base: String,
    client: reqwest::Client,
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    async fn start_with(tweak: impl FnOnce(&mut Config)) -> Self {
        let tmp = TempDir::new().unwrap();
        let port = find_free_port();
        let mut config = Config::minimal();
        config.archive.question_paper_dir = tmp.path().join("past_papers");
        config.archive.marking_scheme_dir = tmp.path().join("pyp_anschm");
        config.server.bind = format!("127.0.0.1:{}", port);
        tweak(&mut config);

        tokio::spawn(async move {
            run_server_with_extractor(&config, Arc::new(FormFeedPages))
                .await
                .unwrap();
        });

        let base = format!("http://127.0.0.1:{}", port);
        wait_for_server(&base).await;
        TestServer {
            _tmp: tmp,
            base,
            client: reqwest::Client::new(),
        }
    }

    async fn upload(&self, kind: &str, query: &str, body: &'static [u8]) -> reqwest::Response {
        self.client
            .put(format!("{}/papers/{}?{}", self.base, kind, query))
            .body(body)
            .send()
            .await
            .unwrap()
    }

    async fn new_session(&self) -> String {
        let resp: serde_json::Value = self
            .client
            .post(format!("{}/sessions", self.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        resp["id"].as_str().unwrap().to_string()
    }

    async fn post_json(&self, path: &str, body: serde_json::Value) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.base, path))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn delete(&self, path: &str) -> reqwest::Response {
        self.client
            .delete(format!("{}{}", self.base, path))
            .send()
            .await
            .unwrap()
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base, path))
            .send()
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn test_health() {
    let server = TestServer::start().await;
    let resp: serde_json::Value = server.get("/health").await.json().await.unwrap();
    assert_eq!(resp["status"], "ok");
}

#[tokio::test]
async fn test_upload_and_list() {
    let server = TestServer::start().await;
    let resp = server
        .upload(
            "qp",
            "year=2023&session=JUNE&paper=2&variant=21",
            b"%PDF-1.4\nQuestion 1",
        )
        .await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["file_name"], "9626_s23_qp_21.pdf");

    let listed: serde_json::Value = server.get("/papers/qp").await.json().await.unwrap();
    let entries = listed["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["file_name"], "9626_s23_qp_21.pdf");
    assert_eq!(entries[0]["name"]["session"], "JUNE");

    let download = server.get("/papers/qp/9626_s23_qp_21.pdf").await;
    assert_eq!(download.status(), 200);
    assert_eq!(download.bytes().await.unwrap().as_ref(), b"%PDF-1.4\nQuestion 1");
}

#[tokio::test]
async fn test_upload_rejects_invalid_variant() {
    let server = TestServer::start().await;
    let resp = server
        .upload("qp", "year=2023&session=JUNE&paper=1&variant=21", b"%PDF-1.4\nx")
        .await;
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_download_missing_is_404() {
    let server = TestServer::start().await;
    let resp = server.get("/papers/ms/9626_s23_ms_21.pdf").await;
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_search_then_marking_schemes() {
    let server = TestServer::start().await;
    server
        .upload(
            "qp",
            "year=2021&session=MARCH&paper=1&variant=11",
            b"%PDF cover\x0cExplain network topology",
        )
        .await;
    server
        .upload(
            "qp",
            "year=2021&session=NOVEMBER&paper=1&variant=11",
            b"%PDF network cover",
        )
        .await;
    server
        .upload(
            "ms",
            "year=2021&session=NOVEMBER&paper=1&variant=11",
            b"%PDF scheme",
        )
        .await;

    let id = server.new_session().await;
    let resp: serde_json::Value = server
        .post_json(
            &format!("/sessions/{}/search", id),
            serde_json::json!({"topic": "Network", "year": 2021, "paper": 1, "variant": "11"}),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(resp["found"], true);
    let results = resp["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["source_file"], "9626_m21_qp_11.pdf");
    assert_eq!(results[0]["pages"], serde_json::json!([2]));
    assert_eq!(results[1]["source_file"], "9626_w21_qp_11.pdf");

    let schemes: serde_json::Value = server
        .get(&format!("/sessions/{}/marking-schemes", id))
        .await
        .json()
        .await
        .unwrap();
    let found = schemes["found"].as_array().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["marking_scheme"], "9626_w21_ms_11.pdf");
    assert!(found[0]["data_uri"]
        .as_str()
        .unwrap()
        .starts_with("data:application/pdf;base64,"));
    assert_eq!(schemes["missing"], serde_json::json!(["9626_m21_ms_11.pdf"]));
    assert!(schemes["message"].is_null());
}

#[tokio::test]
async fn test_empty_search_keeps_previous_results() {
    let server = TestServer::start().await;
    server
        .upload(
            "qp",
            "year=2021&session=JUNE&paper=1&variant=11",
            b"%PDF network",
        )
        .await;
    let id = server.new_session().await;
    server
        .post_json(
            &format!("/sessions/{}/search", id),
            serde_json::json!({"topic": "network", "year": 2021, "paper": 1, "variant": "11"}),
        )
        .await;

    let miss: serde_json::Value = server
        .post_json(
            &format!("/sessions/{}/search", id),
            serde_json::json!({"topic": "cloud", "year": 2021, "paper": 1, "variant": "11"}),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(miss["found"], false);
    assert_eq!(miss["message"], "No questions found for Variant 11 in 2021.");

    let schemes: serde_json::Value = server
        .get(&format!("/sessions/{}/marking-schemes", id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(schemes["missing"], serde_json::json!(["9626_s21_ms_11.pdf"]));
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let server = TestServer::start().await;
    server
        .upload(
            "qp",
            "year=2021&session=JUNE&paper=1&variant=11",
            b"%PDF network",
        )
        .await;
    let searched = server.new_session().await;
    let fresh = server.new_session().await;
    server
        .post_json(
            &format!("/sessions/{}/search", searched),
            serde_json::json!({"year": 2021, "paper": 1, "variant": "11"}),
        )
        .await;

    let schemes: serde_json::Value = server
        .get(&format!("/sessions/{}/marking-schemes", fresh))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(schemes["message"], "Nothing to show: run a search first.");
    assert_eq!(
        server
            .get(&format!("/sessions/{}/export", fresh))
            .await
            .status(),
        204
    );
}

#[tokio::test]
async fn test_unknown_session_is_404() {
    let server = TestServer::start().await;
    let resp = server
        .post_json(
            "/sessions/00000000-0000-0000-0000-000000000000/search",
            serde_json::json!({"year": 2021, "paper": 1, "variant": "11"}),
        )
        .await;
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_batch_and_export() {
    let server = TestServer::start().await;
    server
        .upload(
            "qp",
            "year=2020&session=NOVEMBER&paper=1&variant=11",
            b"%PDF network basics",
        )
        .await;
    server
        .upload(
            "qp",
            "year=2021&session=MARCH&paper=1&variant=11",
            b"%PDF CORRUPT",
        )
        .await;
    let id = server.new_session().await;

    let resp: serde_json::Value = server
        .post_json(
            &format!("/sessions/{}/batch", id),
            serde_json::json!({"topic": "network", "start_year": 2019, "paper": 1, "variant": "11"}),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(resp["found"], true);
    assert_eq!(resp["message"], "Successfully compiled questions for 2019-2022");
    let sections = resp["sections"].as_array().unwrap();
    assert_eq!(sections.len(), 1);
    assert_eq!(sections[0]["year"], 2020);
    assert_eq!(sections[0]["session"], "NOVEMBER");
    assert!(resp["preview"]
        .as_str()
        .unwrap()
        .contains("YEAR: 2020 | SESSION: W"));
    let failures = resp["failures"].as_array().unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0]["source_file"], "9626_m21_qp_11.pdf");

    let download = resp["download"].as_str().unwrap().to_string();
    let export = server.get(&download).await;
    assert_eq!(export.status(), 200);
    let disposition = export.headers()["content-disposition"]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("Batch_network_2019.docx"));
    assert!(export.bytes().await.unwrap().starts_with(b"PK"));
}

#[tokio::test]
async fn test_batch_rejects_window_past_year_limit() {
    let server = TestServer::start().await;
    let id = server.new_session().await;
    let resp = server
        .post_json(
            &format!("/sessions/{}/batch", id),
            serde_json::json!({"start_year": 2097, "paper": 1, "variant": "11"}),
        )
        .await;
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_unknown_session_batch_is_404() {
    let server = TestServer::start().await;
    let resp = server
        .post_json(
            "/sessions/00000000-0000-0000-0000-000000000000/batch",
            serde_json::json!({"start_year": 2019, "paper": 1, "variant": "11"}),
        )
        .await;
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_delete_session() {
    let server = TestServer::start().await;
    let id = server.new_session().await;

    let resp = server.delete(&format!("/sessions/{}", id)).await;
    assert_eq!(resp.status(), 204);

    let after = server.get(&format!("/sessions/{}/marking-schemes", id)).await;
    assert_eq!(after.status(), 404);
    let again = server.delete(&format!("/sessions/{}", id)).await;
    assert_eq!(again.status(), 404);
}

#[tokio::test]
async fn test_idle_sessions_are_evicted() {
    let server = TestServer::start_with(|config| config.server.session_idle_secs = 1).await;
    let id = server.new_session().await;
    tokio::time::sleep(Duration::from_millis(1500)).await;

    // Creating a session sweeps idle ones.
    server.new_session().await;
    let resp = server.get(&format!("/sessions/{}/marking-schemes", id)).await;
    assert_eq!(resp.status(), 404);
}
