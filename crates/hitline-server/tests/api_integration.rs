#[allow(dead_code)]
mod common;

use serde_json::json;

use common::{TestServer, default_config, now_ms};

#[tokio::test]
async fn health_and_ready_are_public() {
    let server = TestServer::with_auth("secret").await;

    let resp = reqwest::get(format!("{}/health", server.base_url()))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["session"]["lifecycle"], "idle");
    assert_eq!(body["session"]["devices"], 4);

    let resp = reqwest::get(format!("{}/ready", server.base_url()))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn ready_fails_without_devices() {
    let mut config = default_config();
    config.devices.simulated.clear();
    let server = TestServer::from_config(config).await;

    let resp = reqwest::get(format!("{}/ready", server.base_url()))
        .await
        .unwrap();
    assert_eq!(resp.status(), 503);
}

#[tokio::test]
async fn api_rejects_missing_token() {
    let server = TestServer::with_auth("secret").await;
    let client = reqwest::Client::new();

    let resp = client.get(server.api("/session")).send().await.unwrap();
    assert_eq!(resp.status(), 401);

    let resp = client
        .get(server.api("/session"))
        .bearer_auth("secret")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn manual_session_round_trip() {
    let server = TestServer::new().await;

    let (status, body) = server
        .post(
            "/session/start",
            json!({
                "device_ids": ["lane-1", "lane-2"],
                "params": { "game_id": "game-manual" }
            }),
        )
        .await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["success_ids"], json!(["lane-1", "lane-2"]));
    assert_eq!(body["error_ids"], json!([]));

    let (_, session) = server.get("/session").await;
    assert_eq!(session["lifecycle"], "running");
    assert_eq!(session["game_id"], "game-manual");

    let t = now_ms();
    let (status, body) = server
        .post(
            "/hits",
            json!([
                { "device_id": "lane-1", "timestamp_ms": t + 100 },
                { "device_id": "lane-2", "timestamp_ms": t + 600 },
                { "device_id": "lane-1", "timestamp_ms": t + 900 }
            ]),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["accepted"], 3);
    assert_eq!(body["rejected"], 0);

    let (_, session) = server.get("/session").await;
    assert_eq!(session["total_hits"], 3);
    assert_eq!(session["hits_by_device"]["lane-1"], 2);

    let (status, body) = server.post("/session/stop", json!({})).await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["result"], "finalized");
    assert_eq!(body["report"]["persisted"], true);

    let (status, entry) = server.get("/history/game-manual").await;
    assert_eq!(status, 200);
    assert_eq!(entry["total_hits"], 3);
    assert_eq!(entry["stop_reason"], "manual");
    assert_eq!(entry["hits_by_device"]["lane-2"], 1);

    let (_, session) = server.get("/session").await;
    assert_eq!(session["lifecycle"], "idle");
}

#[tokio::test]
async fn stop_while_idle_is_a_no_op() {
    let server = TestServer::new().await;
    let (status, body) = server.post("/session/stop", json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(body["result"], "not_running");
    assert_eq!(body["lifecycle"], "idle");
}

#[tokio::test]
async fn second_start_conflicts() {
    let server = TestServer::new().await;
    let (status, _) = server
        .post("/session/start", json!({ "device_ids": ["lane-1"] }))
        .await;
    assert_eq!(status, 200);

    let (status, body) = server
        .post("/session/start", json!({ "device_ids": ["lane-2"] }))
        .await;
    assert_eq!(status, 409);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn invalid_params_are_rejected() {
    let server = TestServer::new().await;

    let (status, _) = server
        .post("/session/start", json!({ "device_ids": [] }))
        .await;
    assert_eq!(status, 400);

    let (status, _) = server
        .post(
            "/session/start",
            json!({
                "device_ids": ["lane-1"],
                "params": { "goal_shots_per_target": { "lane-2": 3 } }
            }),
        )
        .await;
    assert_eq!(status, 400);

    let (status, _) = server
        .post(
            "/session/start",
            json!({
                "device_ids": ["ghost"],
                "params": { "require_online": true }
            }),
        )
        .await;
    assert_eq!(status, 400);

    let (_, session) = server.get("/session").await;
    assert_eq!(session["lifecycle"], "idle");
}

#[tokio::test]
async fn all_devices_failing_is_bad_gateway() {
    let server = TestServer::new().await;
    let (status, _) = server
        .post("/session/start", json!({ "device_ids": ["lane-bad"] }))
        .await;
    assert_eq!(status, 502);

    let (_, session) = server.get("/session").await;
    assert_eq!(session["lifecycle"], "error");
    assert_eq!(session["device_outcomes"]["lane-bad"], "error");
}

#[tokio::test]
async fn partial_start_keeps_running() {
    let server = TestServer::new().await;
    let (status, body) = server
        .post(
            "/session/start",
            json!({ "device_ids": ["lane-1", "lane-bad"] }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["success_ids"], json!(["lane-1"]));
    assert_eq!(body["error_ids"], json!(["lane-bad"]));
    assert!(body["errors"]["lane-bad"].is_string());

    let (_, session) = server.get("/session").await;
    assert_eq!(session["lifecycle"], "running");

    // Retry targets only the failed device, which still refuses.
    let (status, body) = server.post("/session/retry", json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(body["success_ids"], json!([]));
    assert_eq!(body["error_ids"], json!(["lane-bad"]));

    let (_, session) = server.get("/session").await;
    assert_eq!(session["lifecycle"], "running");
}

#[tokio::test]
async fn hits_outside_a_session_are_rejected() {
    let server = TestServer::new().await;
    let (status, body) = server
        .post(
            "/hits",
            json!({ "device_id": "lane-1", "timestamp_ms": now_ms() }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["accepted"], 0);
    assert_eq!(body["rejected"], 1);
}

#[tokio::test]
async fn oversized_hit_batch_is_rejected() {
    let mut config = default_config();
    config.limits.hit_batch_limit = 2;
    let server = TestServer::from_config(config).await;

    let hits: Vec<_> = (0..3)
        .map(|i| json!({ "device_id": "lane-1", "timestamp_ms": i }))
        .collect();
    let (status, _) = server.post("/hits", json!(hits)).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn goal_reached_stops_the_session() {
    let server = TestServer::new().await;
    let (status, _) = server
        .post(
            "/session/start",
            json!({
                "device_ids": ["lane-1"],
                "params": {
                    "game_id": "game-goal",
                    "goal_shots_per_target": { "lane-1": 2 }
                }
            }),
        )
        .await;
    assert_eq!(status, 200);

    let t = now_ms();
    let (_, body) = server
        .post(
            "/hits",
            json!([
                { "device_id": "lane-1", "timestamp_ms": t + 200 },
                { "device_id": "lane-1", "timestamp_ms": t + 700 }
            ]),
        )
        .await;
    assert_eq!(body["accepted"], 2);

    server.wait_for_lifecycle("idle").await;

    let (status, entry) = server.get("/history/game-goal").await;
    assert_eq!(status, 200);
    assert_eq!(entry["stop_reason"], "goal");
    assert_eq!(entry["total_hits"], 2);
}

#[tokio::test]
async fn device_stopped_reports_reach_the_coordinator() {
    let server = TestServer::new().await;
    server
        .post(
            "/session/start",
            json!({
                "device_ids": ["lane-1", "lane-2"],
                "params": {
                    "game_id": "game-device-stop",
                    "goal_shots_per_target": { "lane-1": 1, "lane-2": 1 }
                }
            }),
        )
        .await;

    let (status, body) = server.post("/devices/lane-1/stopped", json!({})).await;
    assert_eq!(status, 202);
    assert_eq!(body["queued"], true);

    let (_, session) = server.get("/session").await;
    assert_eq!(session["stopped_devices"], json!(["lane-1"]));
    assert_eq!(session["lifecycle"], "running");

    server.post("/devices/lane-2/stopped", json!({})).await;
    server.wait_for_lifecycle("idle").await;

    let (status, entry) = server.get("/history/game-device-stop").await;
    assert_eq!(status, 200);
    assert_eq!(entry["stop_reason"], "goal");
}

#[tokio::test]
async fn duration_elapses_into_history() {
    let mut config = default_config();
    config.session.tick_interval_ms = 100;
    let server = TestServer::from_config(config).await;

    let (status, _) = server
        .post(
            "/session/start",
            json!({
                "device_ids": ["lane-1"],
                "params": { "game_id": "game-timed", "desired_duration_seconds": 1 }
            }),
        )
        .await;
    assert_eq!(status, 200);

    server.wait_for_lifecycle("idle").await;

    let (status, entry) = server.get("/history/game-timed").await;
    assert_eq!(status, 200);
    assert_eq!(entry["stop_reason"], "duration");
    assert!(entry["duration_ms"].as_u64().unwrap() >= 900);
}

#[tokio::test]
async fn unknown_history_is_not_found() {
    let server = TestServer::new().await;
    let (status, body) = server.get("/history/missing").await;
    assert_eq!(status, 404);
    assert!(body["error"].as_str().unwrap().contains("missing"));
}

#[tokio::test]
async fn flush_with_nothing_pending() {
    let server = TestServer::new().await;
    let (status, body) = server.post("/history/flush", json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({ "persisted": 0, "remaining": 0 }));
}

#[tokio::test]
async fn far_future_hit_timestamps_are_scored() {
    let server = TestServer::new().await;
    let (status, body) = server
        .post(
            "/session/start",
            json!({ "device_ids": ["lane-1"], "params": { "game_id": "game-far" } }),
        )
        .await;
    assert_eq!(status, 200, "{body}");

    let (status, body) = server
        .post(
            "/hits",
            json!([
                { "device_id": "lane-1", "timestamp_ms": 9_223_372_036_854_775_808u64 },
                { "device_id": "lane-1", "timestamp_ms": u64::MAX }
            ]),
        )
        .await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["accepted"], 2);

    let (status, session) = server.get("/session").await;
    assert_eq!(status, 200, "{session}");
    assert_eq!(session["total_hits"], 2);

    let (status, body) = server.post("/session/stop", json!({})).await;
    assert_eq!(status, 200, "{body}");
}
