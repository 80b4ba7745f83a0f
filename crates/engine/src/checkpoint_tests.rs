use super::*;

#[test]
fn backoff_delay_grows_with_attempt_and_stays_bounded() {
    let first = backoff_delay(1);
    let fifth = backoff_delay(5);
    assert!(first.as_millis() >= BASE_DELAY_MS as u128);
    assert!(fifth > first);
    assert!(fifth.as_millis() < Duration::from_secs(120).as_millis());
}

#[tokio::test]
async fn noop_client_satisfies_the_whole_trait() {
    let client = NoopCheckpointClient;
    let event = EventPayload::new("a", serde_json::Value::Null);
    let resp = client
        .checkpoint_new_run(NewRunRequest {
            run_id: "r1",
            event: &event,
            steps: &[],
            execution_version: 2,
            retries: 0,
        })
        .await
        .expect("ok");
    assert_eq!(resp.token, "token");

    client
        .checkpoint_steps("app", "fn", "r1", &[])
        .await
        .expect("ok");
    client
        .checkpoint_steps_async("r1", "fn", "q1", &[])
        .await
        .expect("ok");
}
