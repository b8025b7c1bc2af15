//! Integration tests for the FreeCAD XML-RPC client.
//!
//! A small axum server on a random loopback port plays the FreeCAD addon,
//! decoding each `methodCall` and answering with canned responses.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use freecad_mcp::freecad::xmlrpc::{decode_call, encode_fault, encode_response};
use freecad_mcp::freecad::{
    FreeCadConnection, FreeCadError, FreeCadRpc, ObjectSpec, ViewName, XmlRpcError,
};
use serde_json::{json, Map, Value};

type Calls = Arc<Mutex<Vec<(String, Vec<Value>)>>>;

async fn addon(State(calls): State<Calls>, body: String) -> Response {
    let (method, params) = match decode_call(&body) {
        Ok(call) => call,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    calls.lock().unwrap().push((method.clone(), params.clone()));

    let result = match method.as_str() {
        "ping" => json!(true),
        "create_document" => json!({ "success": true, "document_name": params[0] }),
        "create_object" => json!({ "success": true, "object_name": params[1]["Name"] }),
        "delete_object" => json!({ "success": false, "error": "Object not found" }),
        "get_objects" => json!([
            { "Name": "Box", "Label": "Box", "TypeId": "Part::Box", "Length": 10.0 },
            { "Name": "Sketch", "Label": "Sketch", "TypeId": "Sketcher::SketchObject", "Shape": null }
        ]),
        "list_documents" => json!(["Gear", "Housing"]),
        "get_active_screenshot" => match params[0].as_str() {
            Some("Front") => Value::Null,
            Some("Top") => json!("not base64 at all!"),
            _ => json!("iVBORw0KGgo="),
        },
        "get_parts_list" => {
            return (StatusCode::INTERNAL_SERVER_ERROR, "parts library crashed").into_response();
        }
        "execute_code" => {
            return xml(encode_fault(1, "<class 'NameError'>: name 'Part' is not defined"));
        }
        _ => return xml(encode_fault(-32601, &format!("method \"{method}\" is not supported"))),
    };

    xml(encode_response(&result))
}

fn xml(body: String) -> Response {
    ([(header::CONTENT_TYPE, "text/xml")], body).into_response()
}

async fn start_addon() -> (FreeCadConnection, Calls) {
    let calls = Calls::default();
    let app = Router::new()
        .route("/", post(addon))
        .with_state(Arc::clone(&calls));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let conn = FreeCadConnection::new("127.0.0.1", port, Duration::from_secs(5)).unwrap();
    (conn, calls)
}

#[tokio::test]
async fn test_ping() {
    let (conn, calls) = start_addon().await;

    assert!(conn.ping().await.unwrap());
    assert_eq!(calls.lock().unwrap()[0], ("ping".to_string(), Vec::new()));
}

#[tokio::test]
async fn test_create_object_sends_spec_struct() {
    let (conn, calls) = start_addon().await;

    let mut properties = Map::new();
    properties.insert("Length".to_string(), json!(10));
    properties.insert("Placement".to_string(), json!({ "Base": { "x": 0.5, "y": 0, "z": 0 } }));
    let spec = ObjectSpec {
        name: "Box".to_string(),
        object_type: "Part::Box".to_string(),
        analysis: None,
        properties,
    };

    let reply = conn.create_object("Gear", &spec).await.unwrap();
    assert!(reply.success);
    assert_eq!(reply.object_name.as_deref(), Some("Box"));

    let calls = calls.lock().unwrap();
    let (method, params) = &calls[0];
    assert_eq!(method, "create_object");
    assert_eq!(params[0], "Gear");
    assert_eq!(params[1]["Type"], "Part::Box");
    assert_eq!(params[1]["Properties"]["Length"], 10);
    assert_eq!(params[1]["Properties"]["Placement"]["Base"]["x"], 0.5);
    assert!(params[1].get("Analysis").is_none());
}

#[tokio::test]
async fn test_failed_operation_is_a_reply_not_an_error() {
    let (conn, _calls) = start_addon().await;

    let reply = conn.delete_object("Gear", "Ghost").await.unwrap();
    assert!(!reply.success);
    assert_eq!(reply.error_text(), "Object not found");
}

#[tokio::test]
async fn test_struct_array_and_nil_values_decode() {
    let (conn, _calls) = start_addon().await;

    let objects = conn.get_objects("Gear").await.unwrap();
    assert_eq!(objects[0]["TypeId"], "Part::Box");
    assert_eq!(objects[0]["Length"], 10.0);
    assert_eq!(objects[1]["Shape"], Value::Null);

    let documents = conn.list_documents().await.unwrap();
    assert_eq!(documents, ["Gear", "Housing"]);
}

#[tokio::test]
async fn test_fault_is_a_typed_error() {
    let (conn, _calls) = start_addon().await;

    let err = conn.execute_code("Part.show()").await.unwrap_err();
    match err {
        FreeCadError::Rpc {
            method,
            source: XmlRpcError::Fault { code, message },
        } => {
            assert_eq!(method, "execute_code");
            assert_eq!(code, 1);
            assert!(message.contains("NameError"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_unknown_method_fault() {
    let (conn, _calls) = start_addon().await;

    let err = conn.call("make_coffee", &[]).await.unwrap_err();
    assert!(matches!(
        err,
        FreeCadError::Rpc {
            source: XmlRpcError::Fault { code: -32601, .. },
            ..
        }
    ));
}

#[tokio::test]
async fn test_http_error_status_is_a_transport_error() {
    let (conn, _calls) = start_addon().await;

    let err = conn.get_parts_list().await.unwrap_err();
    assert!(matches!(err, FreeCadError::Transport { .. }));
}

#[tokio::test]
async fn test_screenshot_variants() {
    let (conn, calls) = start_addon().await;

    let image = conn.get_active_screenshot(ViewName::Isometric).await.unwrap();
    assert_eq!(image.as_deref(), Some("iVBORw0KGgo="));

    let none = conn.get_active_screenshot(ViewName::Front).await.unwrap();
    assert!(none.is_none());

    let err = conn.get_active_screenshot(ViewName::Top).await.unwrap_err();
    assert!(matches!(err, FreeCadError::UnexpectedResult { .. }));

    let calls = calls.lock().unwrap();
    assert_eq!(calls[0].1, [json!("Isometric")]);
}

#[tokio::test]
async fn test_create_document_reply() {
    let (conn, _calls) = start_addon().await;

    let reply = conn.create_document("Doc").await.unwrap();
    assert!(reply.success);
    assert_eq!(reply.document_name.as_deref(), Some("Doc"));
}
