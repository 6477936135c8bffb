use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ghrun_access::AllowList;
use ghrun_cli::{run_bot, BotSettings, TokenStoreSettings, TransportSettings};
use ghrun_commands::{CommandHandler, InboundUpdate};
use ghrun_credentials::{CredentialCipher, FileTokenStore};
use ghrun_github::{GithubWorkflowClient, GithubWorkflowClientConfig, WorkflowTarget};
use ghrun_telegram::{
    build_webhook_router, TelegramApiClient, TelegramApiConfig, UpdateDispatcher, WebhookState,
};
use httpmock::prelude::*;
use serde_json::json;
use tokio::net::TcpListener;

const SECRET: &str = "integration-deployment-secret";
const RUNS_PATH: &str = "/repos/acme/app/actions/workflows/ci.yml/runs";
const DISPATCH_PATH: &str = "/repos/acme/app/actions/workflows/ci.yml/dispatches";

fn target() -> WorkflowTarget {
    WorkflowTarget {
        owner: "acme".to_string(),
        repo: "app".to_string(),
        workflow: "ci.yml".to_string(),
    }
}

fn handler(
    github: &MockServer,
    tokens_file: &Path,
    allow_list: AllowList,
    global_token: Option<&str>,
) -> CommandHandler {
    let mut config = GithubWorkflowClientConfig::new(target());
    config.api_base = github.base_url();
    config.request_timeout_ms = 2_000;
    CommandHandler::new(
        allow_list,
        Arc::new(CredentialCipher::from_secret(SECRET)),
        Arc::new(FileTokenStore::new(tokens_file)),
        Arc::new(GithubWorkflowClient::new(config).expect("github client")),
    )
    .with_global_token(global_token.map(str::to_string))
}

fn message(sender: &str, text: &str) -> InboundUpdate {
    InboundUpdate {
        sender_id: sender.to_string(),
        chat_id: sender.to_string(),
        text: text.to_string(),
    }
}

#[tokio::test]
async fn integration_stored_token_survives_restart_and_authorizes_status() {
    let github = MockServer::start();
    let runs = github.mock(|when, then| {
        when.method(GET)
            .path(RUNS_PATH)
            .header("authorization", "Bearer ghp_example123");
        then.status(200).json_body(json!({
            "total_count": 1,
            "workflow_runs": [{"id": 77, "status": "completed", "conclusion": "success"}]
        }));
    });
    let temp = tempfile::tempdir().expect("tempdir");
    let tokens_file = temp.path().join("tokens.json");

    let first = handler(&github, &tokens_file, AllowList::default(), None);
    assert_eq!(
        first.handle(&message("7", "/mytoken_status")).await,
        "No token available (neither personal nor global)."
    );
    assert_eq!(
        first.handle(&message("7", "/addtoken ghp_example123")).await,
        "Token saved (encrypted)."
    );

    let raw = std::fs::read_to_string(&tokens_file).expect("tokens file");
    assert!(!raw.contains("ghp_example123"));
    let parsed: serde_json::Value = serde_json::from_str(&raw).expect("json");
    assert!(parsed["7"]["token"].is_string());

    let restarted = handler(&github, &tokens_file, AllowList::default(), None);
    let reply = restarted.handle(&message("7", "/mytoken_status")).await;
    assert_eq!(reply, "Latest run id=77\nstatus=completed\nconclusion=success");
    runs.assert();
}

#[tokio::test]
async fn integration_busy_workflow_is_not_dispatched() {
    let github = MockServer::start();
    github.mock(|when, then| {
        when.method(GET).path(RUNS_PATH);
        then.status(200).json_body(json!({
            "total_count": 1,
            "workflow_runs": [{"id": 31, "status": "in_progress", "conclusion": null}]
        }));
    });
    let dispatch = github.mock(|when, then| {
        when.method(POST).path(DISPATCH_PATH);
        then.status(204);
    });
    let temp = tempfile::tempdir().expect("tempdir");
    let handler = handler(
        &github,
        &temp.path().join("tokens.json"),
        AllowList::default(),
        Some("ghp_global"),
    );

    let reply = handler.handle(&message("1", "/run main")).await;
    assert_eq!(
        reply,
        "Workflow is already running (run 31, status in_progress)."
    );
    dispatch.assert_calls(0);
}

#[tokio::test]
async fn integration_rejected_dispatch_falls_back_to_rerun() {
    let github = MockServer::start();
    github.mock(|when, then| {
        when.method(GET).path(RUNS_PATH);
        then.status(200).json_body(json!({
            "total_count": 1,
            "workflow_runs": [{"id": 30, "status": "completed", "conclusion": "failure"}]
        }));
    });
    let dispatch = github.mock(|when, then| {
        when.method(POST)
            .path(DISPATCH_PATH)
            .json_body(json!({"ref": "release", "inputs": {"env": "staging"}}));
        then.status(422)
            .json_body(json!({"message": "Workflow does not have 'workflow_dispatch' trigger"}));
    });
    let rerun = github.mock(|when, then| {
        when.method(POST)
            .path("/repos/acme/app/actions/runs/30/rerun")
            .header("authorization", "Bearer ghp_global");
        then.status(201);
    });
    let temp = tempfile::tempdir().expect("tempdir");
    let handler = handler(
        &github,
        &temp.path().join("tokens.json"),
        AllowList::default(),
        Some("ghp_global"),
    );

    let reply = handler
        .handle(&message("1", "/run release env=staging"))
        .await;
    assert_eq!(reply, "Workflow rerun started for run 30.");
    dispatch.assert();
    rerun.assert();
}

#[tokio::test]
async fn integration_denied_user_never_reaches_store_or_github() {
    let github = MockServer::start();
    let any_call = github.mock(|when, then| {
        when.path_includes("/repos/");
        then.status(200).json_body(json!({"total_count": 0, "workflow_runs": []}));
    });
    let temp = tempfile::tempdir().expect("tempdir");
    let tokens_file = temp.path().join("tokens.json");
    let handler = handler(
        &github,
        &tokens_file,
        AllowList::parse("100"),
        Some("ghp_global"),
    );

    for text in ["/addtoken ghp_x", "/mytoken_status", "/run", "/deltoken"] {
        assert_eq!(
            handler.handle(&message("200", text)).await,
            "Access denied."
        );
    }
    any_call.assert_calls(0);
    assert!(!tokens_file.exists());
}

#[tokio::test]
async fn integration_webhook_delivers_reply_through_telegram() {
    let github = MockServer::start();
    let telegram = MockServer::start();
    let reply = telegram.mock(|when, then| {
        when.method(POST)
            .path("/botwebhook-token/sendMessage")
            .body_includes("\"chat_id\":\"555\"")
            .body_includes("No token available");
        then.status(200).json_body(json!({"ok": true, "result": {}}));
    });

    let temp = tempfile::tempdir().expect("tempdir");
    let handler = handler(
        &github,
        &temp.path().join("tokens.json"),
        AllowList::default(),
        None,
    );
    let telegram_client = Arc::new(
        TelegramApiClient::new(TelegramApiConfig {
            api_base: telegram.base_url(),
            bot_token: "webhook-token".to_string(),
            request_timeout_ms: 2_000,
        })
        .expect("telegram client"),
    );
    let state = Arc::new(WebhookState::new(
        UpdateDispatcher::new(Arc::new(handler), telegram_client),
        Some("hook-secret".to_string()),
    ));
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = build_webhook_router(state.clone());
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    tokio::time::sleep(Duration::from_millis(25)).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/webhooks/telegram"))
        .header("x-telegram-bot-api-secret-token", "hook-secret")
        .json(&json!({
            "update_id": 1,
            "message": {"from": {"id": 9}, "chat": {"id": 555}, "text": "/mytoken_status"}
        }))
        .send()
        .await
        .expect("send");
    assert_eq!(response.status().as_u16(), 200);

    state.finish_in_flight().await;
    reply.assert();
    server.abort();
}

#[tokio::test]
async fn integration_polling_bot_answers_once_and_stops_on_shutdown() {
    let github = MockServer::start();
    let telegram = MockServer::start();
    let first_poll = telegram.mock(|when, then| {
        when.method(GET)
            .path("/botpoll-token/getUpdates")
            .query_param_missing("offset");
        then.status(200).json_body(json!({
            "ok": true,
            "result": [{
                "update_id": 1,
                "message": {"from": {"id": 9}, "chat": {"id": 90}, "text": "/help"}
            }]
        }));
    });
    let later_polls = telegram.mock(|when, then| {
        when.method(GET)
            .path("/botpoll-token/getUpdates")
            .query_param("offset", "2");
        then.status(200).json_body(json!({"ok": true, "result": []}));
    });
    let reply = telegram.mock(|when, then| {
        when.method(POST)
            .path("/botpoll-token/sendMessage")
            .body_includes("\"chat_id\":\"90\"")
            .body_includes("/addtoken");
        then.status(200).json_body(json!({"ok": true, "result": {}}));
    });

    let temp = tempfile::tempdir().expect("tempdir");
    let settings = BotSettings {
        telegram_token: "poll-token".to_string(),
        bot_secret: SECRET.to_string(),
        global_github_token: None,
        allow_list: AllowList::default(),
        target: target(),
        default_ref: "main".to_string(),
        token_store: TokenStoreSettings::File {
            path: temp.path().join("tokens.json"),
        },
        transport: TransportSettings::Polling {
            poll_timeout_seconds: 0,
        },
        telegram_api_base: telegram.base_url(),
        github_api_base: github.base_url(),
        http_timeout_ms: 2_000,
    };

    run_bot(settings, tokio::time::sleep(Duration::from_millis(300)))
        .await
        .expect("bot run");

    first_poll.assert();
    assert!(later_polls.calls() >= 1);
    reply.assert();
}
