//! End-to-end flows against the in-memory service.

use std::sync::Arc;
use tether_client::{ClientError, ClientState, LogoutOutcome, Object, Query, SortDirection, Value};
use tether_protocol::messages::endpoint;
use tether_storage::StorageBackend;
use tether_testkit::prelude::*;

#[tokio::test]
async fn guest_edit_sync_round_trip() {
    let service = Arc::new(MemoryService::new());
    let (mut client, storage) = guest_client(&service).await;

    {
        let mut user = client.current_user().unwrap().unwrap();
        assert_eq!(user.fields().count(), 0);
        user.set("name", "Ada");
        user.increment("score", 10).unwrap();
        user.append("tags", "math").unwrap();
        assert_eq!(user.pending_changes(), 3);
    }

    let outcome = client.synchronize_user().await.unwrap();
    assert_eq!(outcome.sent, 3);
    assert!(outcome.is_complete());

    let session_id = client.current_user().unwrap().unwrap().session_id().to_string();
    let server = service.user_data(&session_id).unwrap();
    assert_eq!(server.get("name"), Some(&Value::from("Ada")));
    assert_eq!(server.get("score"), Some(&Value::Integer(10)));

    assert_eq!(
        storage.get_item("tether.userChangelog").await.unwrap().as_deref(),
        Some("[]")
    );
}

#[tokio::test]
async fn server_changes_replace_snapshot() {
    let service = Arc::new(MemoryService::new());
    let (mut client, _) = guest_client(&service).await;
    let session_id = client.current_user().unwrap().unwrap().session_id().to_string();

    client.current_user().unwrap().unwrap().set("local", 1);
    service.set_user_field(&session_id, "remote", Value::from(2));

    client.synchronize_user().await.unwrap();
    let user = client.current_user().unwrap().unwrap();
    assert_eq!(user.get("local"), Some(&Value::from(1)));
    assert_eq!(user.get("remote"), Some(&Value::from(2)));
}

#[tokio::test]
async fn lost_sync_response_is_not_applied_twice() {
    let service = Arc::new(MemoryService::new());
    let (mut client, _) = guest_client(&service).await;
    client
        .current_user()
        .unwrap()
        .unwrap()
        .increment("score", 5)
        .unwrap();

    service.lose_next_response(endpoint::SYNCHRONIZE_USER);
    let err = client.synchronize_user().await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(client.current_user().unwrap().unwrap().pending_changes(), 1);

    let outcome = client.synchronize_user().await.unwrap();
    assert_eq!(outcome.processed, 1);
    assert_eq!(
        client.current_user().unwrap().unwrap().get("score"),
        Some(&Value::Integer(5))
    );
}

#[tokio::test]
async fn resync_without_pending_changes_is_a_no_op() {
    let service = Arc::new(MemoryService::new());
    let (mut client, _) = guest_client(&service).await;
    {
        let mut user = client.current_user().unwrap().unwrap();
        user.set("name", "Ada");
        user.increment("score", 3).unwrap();
    }
    client.synchronize_user().await.unwrap();

    let session_id = client.current_user().unwrap().unwrap().session_id().to_string();
    let server_before = service.user_data(&session_id).unwrap();
    let local_before: Object = client
        .current_user()
        .unwrap()
        .unwrap()
        .fields()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();

    let outcome = client.synchronize_user().await.unwrap();
    assert_eq!((outcome.sent, outcome.processed, outcome.remaining), (0, 0, 0));
    assert_eq!(service.user_data(&session_id).unwrap(), server_before);
    assert_eq!(server_before.get("score"), Some(&Value::Integer(3)));

    let user = client.current_user().unwrap().unwrap();
    let local_after: Object = user.fields().map(|(k, v)| (k.to_string(), v.clone())).collect();
    assert_eq!(local_after, local_before);
    assert_eq!(user.pending_changes(), 0);
}

#[tokio::test]
async fn deferred_changes_stay_pending_until_accepted() {
    let service = Arc::new(MemoryService::new());
    let (mut client, _) = guest_client(&service).await;
    service.defer_field("status");

    {
        let mut user = client.current_user().unwrap().unwrap();
        user.set("status", "away");
        user.set("name", "Ada");
    }
    let outcome = client.synchronize_user().await.unwrap();
    assert_eq!(outcome.processed, 1);
    assert_eq!(outcome.remaining, 1);

    // server wins: the optimistic value is gone until the change lands
    assert_eq!(client.current_user().unwrap().unwrap().get("status"), None);

    service.accept_field("status");
    let outcome = client.synchronize_user().await.unwrap();
    assert!(outcome.is_complete());
    assert_eq!(
        client.current_user().unwrap().unwrap().get("status"),
        Some(&Value::from("away"))
    );
}

#[tokio::test]
async fn sign_up_log_out_log_in() {
    let service = Arc::new(MemoryService::new());
    let (mut client, storage) = memory_client(&service).await;

    client.sign_up("ada@example.com", "pw").await.unwrap();
    client.current_user().unwrap().unwrap().set("name", "Ada");

    let outcome = client.log_out().await.unwrap();
    assert_eq!(outcome, LogoutOutcome::Acknowledged);
    assert_eq!(client.state(), ClientState::LoggedOut);
    assert_eq!(service.session_count(), 0);
    assert_eq!(storage.len(), 1);

    client.log_in("ada@example.com", "pw").await.unwrap();
    let user = client.current_user().unwrap().unwrap();
    assert_eq!(user.get("name"), Some(&Value::from("Ada")));
    assert_eq!(user.get("email"), Some(&Value::from("ada@example.com")));

    let (mut second, _) = memory_client(&service).await;
    let wrong = second.log_in("ada@example.com", "x").await;
    assert!(matches!(wrong, Err(ClientError::Request(_))));
}

#[tokio::test]
async fn log_out_survives_unreachable_invalidation() {
    let service = Arc::new(MemoryService::new());
    let (mut client, storage) = guest_client(&service).await;
    service.fail_next(endpoint::LOG_OUT, ServiceError::Internal("down".into()));

    let outcome = client.log_out().await.unwrap();
    assert!(!outcome.is_acknowledged());
    assert_eq!(client.state(), ClientState::LoggedOut);
    assert_eq!(storage.len(), 1);
    assert_eq!(service.session_count(), 1);
}

#[tokio::test]
async fn convert_guest_keeps_session_and_pending_edits_land() {
    let service = Arc::new(MemoryService::new());
    let (mut client, _) = guest_client(&service).await;
    let session_id = client.current_user().unwrap().unwrap().session_id().to_string();
    client.current_user().unwrap().unwrap().set("name", "Ada");

    client
        .convert_guest_user("ada@example.com", "pw")
        .await
        .unwrap();

    let user = client.current_user().unwrap().unwrap();
    assert_eq!(user.session_id(), session_id);
    assert_eq!(user.get("name"), Some(&Value::from("Ada")));
    assert_eq!(user.get("email"), Some(&Value::from("ada@example.com")));

    let again = client.convert_guest_user("other@example.com", "pw").await;
    assert!(matches!(again, Err(ClientError::Request(m)) if m.contains("not a guest")));
}

#[tokio::test]
async fn state_survives_restart_on_disk() {
    let service = Arc::new(MemoryService::new());
    let store = TempStore::new();

    let installation_id = {
        let mut client = connect(&service, store.open()).await;
        client.log_in_as_guest().await.unwrap();
        client.current_user().unwrap().unwrap().set("draft", "unsent");
        client.save_user().await.unwrap();
        client.installation_id().unwrap().to_string()
    };

    let mut client = connect(&service, store.open()).await;
    assert_eq!(client.installation_id().unwrap(), installation_id);
    assert_eq!(client.state(), ClientState::LoggedIn);
    {
        let user = client.current_user().unwrap().unwrap();
        assert_eq!(user.get("draft"), Some(&Value::from("unsent")));
        assert_eq!(user.pending_changes(), 1);
    }

    client.synchronize_user().await.unwrap();
    assert_eq!(client.current_user().unwrap().unwrap().pending_changes(), 0);
}

#[tokio::test]
async fn custom_functions_and_queries() {
    let service = Arc::new(MemoryService::new().with_master_key("mk"));
    service.register_function("greet", |user, params| {
        let who = params
            .get("who")
            .and_then(Value::as_text)
            .unwrap_or("stranger");
        let guest = user.is_none();
        Ok(Value::object([
            ("greeting", Value::from(format!("hello {who}"))),
            ("anonymous", Value::Bool(guest)),
        ]))
    });
    for (name, age) in [("Ada", 36), ("Grace", 85), ("Alan", 41)] {
        service.insert_document(
            "people",
            Object::from([
                ("name".to_string(), Value::from(name)),
                ("age".to_string(), Value::from(age)),
            ]),
        );
    }

    let (client, _) = memory_client(&service).await;
    let params = Object::from([("who".to_string(), Value::from("Ada"))]);
    let result = client.run("greet", params).await.unwrap();
    assert_eq!(result.get("greeting"), Some(&Value::from("hello Ada")));
    assert_eq!(result.get("anonymous"), Some(&Value::Bool(true)));

    assert!(matches!(
        client.run("greet!", Object::new()).await,
        Err(ClientError::NonAlphanumericFunctionName { .. })
    ));
    assert!(matches!(
        client.run_query(&Query::new("people")).await,
        Err(ClientError::MasterKeyRequired)
    ));

    let config = test_config(&service, Arc::new(tether_storage::InMemoryBackend::new()))
        .with_master_key("mk");
    let admin = tether_client::Client::connect(config).await.unwrap();
    let query = Query::new("people")
        .gt("age", 40)
        .with_sort("age", SortDirection::Ascending);
    let rows = admin.run_query(&query).await.unwrap();
    let names: Vec<&str> = rows
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|row| row.get("name").and_then(Value::as_text))
        .collect();
    assert_eq!(names, ["Alan", "Grace"]);

    let unsupported = admin
        .run_query(&Query::new("people").matches("name", "^A", "i"))
        .await;
    assert!(matches!(unsupported, Err(ClientError::Request(_))));
}

#[tokio::test]
async fn built_in_endpoints_cannot_be_run_as_functions() {
    let service = Arc::new(MemoryService::new());
    let (client, _) = guest_client(&service).await;

    assert!(matches!(
        client.run(endpoint::LOG_OUT, Object::new()).await,
        Err(ClientError::ReservedFunctionName { .. })
    ));
    assert_eq!(client.state(), ClientState::LoggedIn);
    assert_eq!(service.session_count(), 1);
    assert_eq!(service.call_count(endpoint::LOG_OUT), 0);
}

#[tokio::test]
async fn invalidated_session_surfaces_request_error() {
    let service = Arc::new(MemoryService::new());
    let (mut client, _) = guest_client(&service).await;
    let session_id = client.current_user().unwrap().unwrap().session_id().to_string();

    assert!(service.has_session(&session_id));
    service.fail_next(
        endpoint::SYNCHRONIZE_USER,
        ServiceError::AuthenticationFailed("unknown session".into()),
    );

    let err = client.synchronize_user().await.unwrap_err();
    assert!(!err.is_retryable());
    client.force_log_out().await.unwrap();
    assert_eq!(client.state(), ClientState::LoggedOut);
}
