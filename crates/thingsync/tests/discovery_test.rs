use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::Query;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::Uri;
use axum::response::IntoResponse;
use axum::routing::get;
use serde_json::Value;
use serde_json::json;
use thingsync::Adapter;
use thingsync::Config;
use thingsync::Engine;
use thingsync::adapter::ReqwestClient;
use tokio::net::TcpListener;
use tokio::net::UdpSocket;

/// A dimmable lamp served over HTTP. Brightness is clamped to 50.
#[derive(Default)]
struct FakeLamp {
    requests: Mutex<Vec<String>>,
    on: Mutex<bool>,
    level: Mutex<i64>,
}

impl FakeLamp {
    fn record(&self, uri: &Uri) {
        self.requests.lock().unwrap().push(uri.to_string());
    }

    fn count(&self, path_and_query: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.as_str() == path_and_query)
            .count()
    }
}

type Params = Query<std::collections::HashMap<String, String>>;

async fn describe(State(lamp): State<Arc<FakeLamp>>, uri: Uri) -> impl IntoResponse {
    lamp.record(&uri);
    Json(json!({
        "name": "desk lamp",
        "type": "dimmableLight",
        "description": "a lamp on the desk",
        "properties": {
            "on": {"href": "/on", "value": false},
            "level": {"href": "/level", "unit": "percent", "value": 0}
        }
    }))
}

async fn on(State(lamp): State<Arc<FakeLamp>>, uri: Uri, Query(params): Params) -> impl IntoResponse {
    lamp.record(&uri);
    let mut on = lamp.on.lock().unwrap();
    if let Some(value) = params.get("on") {
        *on = value == "true";
    }
    Json(json!({"on": *on}))
}

async fn level(
    State(lamp): State<Arc<FakeLamp>>,
    uri: Uri,
    Query(params): Params,
) -> impl IntoResponse {
    lamp.record(&uri);
    let mut level = lamp.level.lock().unwrap();
    if let Some(value) = params.get("level").and_then(|v| v.parse::<i64>().ok()) {
        *level = value.min(50);
    }
    // Turning the level up also switches the lamp on.
    let mut on = lamp.on.lock().unwrap();
    if *level > 0 {
        *on = true;
    }
    Json(json!({"level": *level, "on": *on}))
}

async fn broken(State(lamp): State<Arc<FakeLamp>>, uri: Uri) -> impl IntoResponse {
    lamp.record(&uri);
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn serve_lamp() -> (Arc<FakeLamp>, String) {
    let lamp = Arc::new(FakeLamp::default());
    let app = Router::new()
        .route("/thing", get(describe))
        .route("/thing/on", get(on))
        .route("/thing/level", get(level))
        .route("/broken", get(broken))
        .with_state(lamp.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (lamp, format!("http://{}", addr))
}

fn start_engine() -> Arc<Engine> {
    let engine = Arc::new(Engine::new());
    let runner = engine.clone();
    tokio::spawn(async move { runner.run().await });
    engine
}

fn adapter(engine: &Engine) -> Adapter {
    let config = Config::default();
    let client = ReqwestClient::new(Duration::from_secs(5)).unwrap();
    Adapter::new(&config, Arc::new(engine.handle()), Arc::new(client))
}

/// Poll the engine state until `check` holds for `device_id`.
async fn wait_for_device<F>(engine: &Engine, device_id: &str, check: F)
where
    F: Fn(&serde_json::Map<String, Value>) -> bool,
{
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let state = engine.state_snapshot();
            if let Some(device) = state.devices.get(device_id) {
                let properties: serde_json::Map<String, Value> = device
                    .properties
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                if check(&properties) {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "device {} never reached expected state", device_id);
}

fn notify(location: &str) -> String {
    format!(
        "NOTIFY * HTTP/1.1\r\nHOST: 239.255.255.250:1900\r\nCACHE-CONTROL: max-age=1800\r\nLOCATION: {}\r\nNT: upnp:rootdevice\r\nNTS: ssdp:alive\r\n\r\n",
        location
    )
}

#[tokio::test]
async fn test_probe_registers_and_refreshes() {
    let (lamp, base) = serve_lamp().await;
    *lamp.on.lock().unwrap() = true;
    let engine = start_engine();
    let adapter = adapter(&engine);

    let ids = adapter.probe(&format!("{}/thing", base)).await;
    assert_eq!(ids, vec!["GenericSSDPAdapter:1".to_string()]);

    let device = adapter.device(&ids[0]).unwrap();
    assert_eq!(device.name, "desk lamp");
    assert_eq!(device.kind, "dimmableLight");
    assert_eq!(device.properties["level"].unit.as_deref(), Some("percent"));

    // The initial refresh picks up the device's real state.
    wait_for_device(&engine, &ids[0], |p| p.get("on") == Some(&json!(true))).await;
    assert_eq!(lamp.count("/thing/on"), 1);
    assert_eq!(lamp.count("/thing/level"), 1);
}

#[tokio::test]
async fn test_write_is_reconciled_with_device() {
    let (lamp, base) = serve_lamp().await;
    let engine = start_engine();
    let adapter = adapter(&engine);

    let id = adapter.probe(&format!("{}/thing", base)).await.remove(0);
    wait_for_device(&engine, &id, |p| p.get("level") == Some(&json!(0))).await;

    // Let the initial refreshes land before writing.
    let refreshed = tokio::time::timeout(Duration::from_secs(5), async {
        while lamp.count("/thing/on") + lamp.count("/thing/level") < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(refreshed.is_ok());
    tokio::time::sleep(Duration::from_millis(200)).await;

    let cached = adapter.set_property(&id, "level", json!(80)).await.unwrap();
    assert_eq!(cached, json!(80));

    // The lamp clamps to 50 and switches itself on.
    wait_for_device(&engine, &id, |p| {
        p.get("level") == Some(&json!(50)) && p.get("on") == Some(&json!(true))
    })
    .await;
    assert_eq!(lamp.count("/thing/level?level=80"), 1);
    assert_eq!(adapter.find_property(&id, "level").unwrap().value, json!(50));
    assert_eq!(adapter.find_property(&id, "on").unwrap().value, json!(true));
}

#[tokio::test]
async fn test_failing_location_registers_nothing() {
    let (lamp, base) = serve_lamp().await;
    let engine = start_engine();
    let adapter = adapter(&engine);

    assert!(adapter.probe(&format!("{}/broken", base)).await.is_empty());
    assert!(adapter.devices().is_empty());
    assert_eq!(lamp.count("/broken"), 1);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(engine.state_snapshot().devices.is_empty());
}

#[tokio::test]
async fn test_pairing_probes_each_location_once() {
    let (lamp, base) = serve_lamp().await;
    let engine = start_engine();
    let adapter = adapter(&engine);

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    adapter
        .start_pairing_with_socket(socket, Duration::from_millis(800))
        .unwrap();
    assert!(adapter.is_pairing());

    let location = format!("{}/thing", base);
    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    for _ in 0..3 {
        sender.send_to(notify(&location).as_bytes(), addr).await.unwrap();
    }

    wait_for_device(&engine, "GenericSSDPAdapter:1", |p| p.contains_key("on")).await;

    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while adapter.is_pairing() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "pairing window never closed");

    assert_eq!(lamp.count("/thing"), 1);
    assert_eq!(adapter.devices().len(), 1);
}
