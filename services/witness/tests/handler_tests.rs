#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Tests for witness handlers
//!
//! Drives the router in-process against an in-memory store.

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use kel_witness::{
    IndexedSignature, KeyEvent, KeyEventBuilder, KeyProvider, MemoryStore, Seal, SignedKeyEvent,
    SoftwareKeyProvider, Threshold, Witness, WitnessConfig, WitnessIdentity, crypto::commit_key,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;
use witness_service::{create_router, handlers::AppState};

fn create_test_app() -> (Router, String) {
    let identity = WitnessIdentity::new(Arc::new(SoftwareKeyProvider::generate()));
    let aid = identity.aid().to_string();
    let config = WitnessConfig::default().with_public_url("http://witness.test");
    let witness = Witness::with_store(config, identity, Arc::new(MemoryStore::new()));
    let app = create_router(Arc::new(AppState {
        witness: Arc::new(witness),
    }));
    (app, aid)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, value)
}

async fn post_json(app: &Router, uri: &str, body: String) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    send(app, request).await
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

async fn process(app: &Router, event: &SignedKeyEvent) -> (StatusCode, Value) {
    post_json(app, "/process", serde_json::to_string(event).unwrap()).await
}

async fn query(app: &Router, body: Value) -> (StatusCode, Value) {
    post_json(app, "/query", body.to_string()).await
}

// ==================== Health Check Tests ====================

#[tokio::test]
async fn test_health() {
    let (app, _) = create_test_app();
    let (status, _) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
}

// ==================== Process Tests ====================

#[tokio::test]
async fn test_concrete_scenario() {
    let (app, _) = create_test_app();
    let mut builder = KeyEventBuilder::new(1);
    let icp = builder.incept().unwrap();
    assert_eq!(icp.event.witness_threshold, Some(0));

    let (status, body) = process(&app, &icp).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["state"]["sn"], 0);
    assert_eq!(body["confidence"], "RECEIPT_THRESHOLD_MET");
    assert!(body["receipt"]["signature"].is_string());
    assert!(body["asOf"].is_string());

    let (status, body) = process(&app, &icp).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "duplicate");
    assert_eq!(body["state"]["sn"], 0);

    let ixn1 = builder.interact(vec![]).unwrap();
    let (status, body) = process(&app, &ixn1).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["state"]["sn"], 1);

    // Jumps ahead of the log, chained to an arbitrary earlier digest
    let mut ixn5 = KeyEvent::create_interaction(&ixn1.event, vec![]).unwrap();
    ixn5.sn = 5;
    ixn5.prior = Some(icp.event.digest.clone());
    ixn5.saidify().unwrap();
    let ixn5 = builder.sign(ixn5).unwrap();

    let (status, body) = process(&app, &ixn5).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "escrowed");
    assert_eq!(body["reason"], "out_of_order");
    assert!(body["asOf"].is_string());
}

#[tokio::test]
async fn test_sweep_promotes_escrowed_event() {
    let (app, _) = create_test_app();
    let mut builder = KeyEventBuilder::new(1);
    let icp = builder.incept().unwrap();
    let links: Vec<_> = (1..=4)
        .map(|_| builder.interact(vec![]).unwrap())
        .collect();
    let ixn5 = builder.interact(vec![]).unwrap();
    let prefix = icp.event.prefix.clone();

    assert_eq!(process(&app, &icp).await.0, StatusCode::OK);
    assert_eq!(process(&app, &ixn5).await.0, StatusCode::ACCEPTED);
    for link in &links {
        assert_eq!(process(&app, link).await.0, StatusCode::OK);
    }

    let (status, body) = post_json(&app, "/escrow/sweep", String::new()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["promoted"], 1);
    assert_eq!(body["retained"], 0);

    let (status, body) = query(&app, json!({"query_type": "state", "prefix": prefix})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"]["sn"], 5);
}

#[tokio::test]
async fn test_rotation_with_uncommitted_keys_is_rejected() {
    let (app, _) = create_test_app();
    let mut builder = KeyEventBuilder::new(1);
    let icp = builder.incept().unwrap();
    assert_eq!(process(&app, &icp).await.0, StatusCode::OK);

    // Validly signed, but by a key the inception never committed to
    let stranger = SoftwareKeyProvider::generate();
    let next = SoftwareKeyProvider::generate();
    let rot = KeyEvent::create_rotation(
        &icp.event,
        vec![stranger.public_key()],
        Threshold::Simple(1),
        vec![commit_key(&next.public_key())],
        vec![],
        0,
    )
    .unwrap();
    let signature = stranger.sign(&rot.signing_bytes().unwrap()).unwrap();
    let rot = SignedKeyEvent::new(
        rot,
        vec![IndexedSignature {
            index: 0,
            signature,
        }],
    );

    let (status, body) = process(&app, &rot).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_failed");
    assert!(body["asOf"].is_string());

    let (_, body) = query(&app, json!({"query_type": "state", "prefix": icp.event.prefix})).await;
    assert_eq!(body["state"]["sn"], 0);
}

#[tokio::test]
async fn test_conflicting_event_is_recorded_as_duplicity() {
    let (app, _) = create_test_app();
    let mut builder = KeyEventBuilder::new(1);
    let icp = builder.incept().unwrap();
    let ixn1 = builder.interact(vec![]).unwrap();
    let seal = Seal {
        i: icp.event.prefix.clone(),
        s: 0,
        d: icp.event.digest.clone(),
    };
    let rival = builder
        .sign(KeyEvent::create_interaction(&icp.event, vec![seal]).unwrap())
        .unwrap();

    process(&app, &icp).await;
    process(&app, &ixn1).await;
    for _ in 0..2 {
        let (status, body) = process(&app, &rival).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "duplicity");
    }

    let (status, body) = query(
        &app,
        json!({"query_type": "duplicity", "prefix": icp.event.prefix}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["records"][0]["conflictingDigest"], rival.event.digest);
}

#[tokio::test]
async fn test_malformed_bodies_are_bad_requests() {
    let (app, _) = create_test_app();

    let (status, body) = post_json(&app, "/process", "{not json".to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request");
    assert!(body["error"].is_string());
    assert!(body["asOf"].is_string());

    let (status, body) = post_json(&app, "/process", json!({"event": {}}).to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["asOf"].is_string());

    let (status, body) = query(&app, json!({"query_type": "mailbox", "prefix": "Eabc"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["asOf"].is_string());

    let (status, _) = query(&app, json!({"query_type": "state"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ==================== Query Tests ====================

#[tokio::test]
async fn test_unknown_identifier_asymmetry() {
    let (app, _) = create_test_app();

    let (status, body) = query(&app, json!({"query_type": "state", "prefix": "Eunknown"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["asOf"].is_string());

    let (status, body) = get(&app, "/oobi/Eunknown").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["asOf"].is_string());

    let (status, body) = query(&app, json!({"query_type": "kel", "prefix": "Eunknown"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 0);
    assert_eq!(body["events"], json!([]));

    let (status, body) = query(
        &app,
        json!({"query_type": "receipts", "event_digest": "Eunknown"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn test_kel_and_receipt_queries() {
    let (app, aid) = create_test_app();
    let mut builder = KeyEventBuilder::new(1);
    let icp = builder.incept().unwrap();
    process(&app, &icp).await;
    for _ in 0..3 {
        process(&app, &builder.interact(vec![]).unwrap()).await;
    }
    let prefix = icp.event.prefix.clone();

    let (_, body) = query(&app, json!({"query_type": "kel", "prefix": prefix})).await;
    assert_eq!(body["count"], 4);

    let (_, body) = query(
        &app,
        json!({"query_type": "kel", "prefix": prefix, "start_sn": 1, "end_sn": 2}),
    )
    .await;
    assert_eq!(body["count"], 2);
    assert_eq!(body["events"][0]["event"]["s"], 1);

    let (_, body) = query(
        &app,
        json!({"query_type": "receipts", "event_digest": icp.event.digest}),
    )
    .await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["receipts"][0]["witnessAid"], aid);

    let (_, body) = query(&app, json!({"query_type": "state", "prefix": prefix})).await;
    assert_eq!(body["receiptCount"], 1);
    assert_eq!(body["confidence"], "RECEIPT_THRESHOLD_MET");
}

// ==================== OOBI Tests ====================

#[tokio::test]
async fn test_introduce() {
    let (app, aid) = create_test_app();
    let (status, body) = get(&app, "/introduce").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["witness"], aid);
    assert_eq!(body["oobi"], format!("http://witness.test/oobi/{}", aid));
    assert!(body["asOf"].is_string());
}

#[tokio::test]
async fn test_resolve_oobi() {
    let (app, aid) = create_test_app();
    let icp = KeyEventBuilder::new(1)
        .with_witnesses(vec![aid.clone()], 1)
        .incept()
        .unwrap();
    process(&app, &icp).await;
    let prefix = &icp.event.prefix;

    let (status, body) = get(&app, &format!("/oobi/{}", prefix)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"]["prefix"], prefix.as_str());
    assert_eq!(
        body["oobi"],
        format!("http://witness.test/oobi/{}/witness/{}", prefix, aid)
    );
    assert_eq!(body["receiptCount"], 1);
    assert_eq!(body["confidence"], "RECEIPT_THRESHOLD_MET");

    let (status, _) = get(&app, &format!("/oobi/{}/witness/{}", prefix, aid)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = get(&app, &format!("/oobi/{}/witness/Bsomeone-else", prefix)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
