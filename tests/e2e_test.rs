//! End-to-end test against a running server
//!
//! Requires:
//! 1. API server running (and the worker, when REDIS_URL is set)
//! 2. `tsc` and `npm` on the server's PATH
//!
//! Run with: cargo test --test e2e_test -- --ignored --nocapture
//!
//! Set API_BASE_URL to override default (http://localhost:3000)

use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::time::Duration;

const MAX_POLLS: u32 = 120;

fn get_base_url() -> String {
    std::env::var("API_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

fn source_file(path: &str, content: &str) -> Part {
    Part::bytes(content.as_bytes().to_vec()).file_name(path.to_string())
}

async fn wait_for_terminal(client: &reqwest::Client, base_url: &str, job_id: &str) -> Value {
    for _ in 0..MAX_POLLS {
        let status: Value = client
            .get(format!("{}/api/status/{}", base_url, job_id))
            .send()
            .await
            .expect("Status request failed")
            .json()
            .await
            .expect("Status response was not JSON");

        if status["status"] == "completed" || status["status"] == "failed" {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    panic!("Job {} did not finish in time", job_id);
}

#[tokio::test]
#[ignore] // Requires running API server and toolchain
async fn test_e2e_health_check() {
    let response = reqwest::get(format!("{}/health", get_base_url()))
        .await
        .expect("Health check failed");

    assert!(
        response.status().is_success(),
        "Health check returned non-success status: {}",
        response.status()
    );
}

#[tokio::test]
#[ignore] // Requires running API server and toolchain
async fn test_e2e_convert_and_download() {
    let base_url = get_base_url();
    let client = reqwest::Client::new();

    let form = Form::new()
        .text("project_name", "e2e-demo")
        .part(
            "files",
            source_file(
                "index.ts",
                "import { greet } from './lib/greet';\nconsole.log(greet(process.argv[2] ?? 'world'));\n",
            ),
        )
        .part(
            "files",
            source_file(
                "lib/greet.ts",
                "export const greet = (name: string): string => `hello ${name}`;\n",
            ),
        );

    let submitted: Value = client
        .post(format!("{}/api/convert", base_url))
        .multipart(form)
        .send()
        .await
        .expect("Upload failed")
        .json()
        .await
        .expect("Upload response was not JSON");
    assert_eq!(submitted["status"], "pending");
    let job_id = submitted["job_id"].as_str().expect("No job_id").to_string();
    println!("Submitted job {}", job_id);

    let status = wait_for_terminal(&client, &base_url, &job_id).await;
    assert_eq!(status["status"], "completed", "Job failed: {}", status["error_message"]);

    let response = client
        .get(format!("{}/api/download/{}", base_url, job_id))
        .send()
        .await
        .expect("Download failed");
    assert!(response.status().is_success());
    let script = response.text().await.expect("Script was not text");
    assert!(script.starts_with("#!/bin/bash\n"));
    assert!(script.contains("hello ${name}"));

    let deleted = client
        .delete(format!("{}/api/jobs/{}", base_url, job_id))
        .send()
        .await
        .expect("Delete failed");
    assert!(deleted.status().is_success());
}
