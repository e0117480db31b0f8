use super::*;

fn store_in(tempdir: &tempfile::TempDir) -> SessionStore {
    SessionStore::new(tempdir.path().join("sessions"), 7).expect("store")
}

fn stored_metadata(store: &SessionStore) -> SessionMetadata {
    let metadata = SessionMetadata::new(generate_session_id(), "op-1".to_string());
    store.create_session(&metadata).expect("create");
    metadata
}

#[test]
fn generated_ids_pass_validation_and_are_stable_length() {
    for _ in 0..32 {
        let id = generate_session_id();
        assert_eq!(id.len(), 32);
        validate_session_id(&id).expect("generated id must validate");
    }
}

#[test]
fn crafted_ids_are_rejected_without_filesystem_access() {
    let tempdir = tempfile::tempdir().expect("tempdir");
    let store = store_in(&tempdir);
    for bad in [
        "../../etc/passwd",
        "..",
        "",
        "short",
        "ABCDEF0123456789ABCDEF0123456789",
        "gggggggggggggggggggggggggggggggg",
        "0123456789abcdef0123456789abcde/",
        "0123456789abcdef0123456789abcdef0",
    ] {
        assert!(validate_session_id(bad).is_err(), "'{bad}' must be rejected");
        assert!(store.get_session(bad).is_err());
        assert!(store.get_prompt(bad).is_err());
        assert!(store.get_response(bad).is_err());
        assert!(store.get_trace_html(bad).is_err());
        assert!(store.get_trace_jsonl(bad).is_err());
        assert!(store.save_prompt(bad, "x").is_err());
    }
    // Nothing outside the sessions root was touched.
    assert!(tempdir.path().join("etc").metadata().is_err());
}

#[test]
fn artifact_absence_is_none_not_error() {
    let tempdir = tempfile::tempdir().expect("tempdir");
    let store = store_in(&tempdir);
    let metadata = stored_metadata(&store);

    let record = store
        .get_session(&metadata.id)
        .expect("lookup")
        .expect("present");
    assert_eq!(record.metadata, metadata);
    assert!(!record.has_prompt);
    assert!(!record.has_response);
    assert!(store.get_prompt(&metadata.id).expect("prompt").is_none());
    assert!(store.get_response(&metadata.id).expect("response").is_none());
    assert!(store.get_trace_html(&metadata.id).expect("html").is_none());
    assert!(store.get_trace_jsonl(&metadata.id).expect("jsonl").is_none());
}

#[test]
fn missing_session_is_none() {
    let tempdir = tempfile::tempdir().expect("tempdir");
    let store = store_in(&tempdir);
    let absent = generate_session_id();
    assert!(store.get_session(&absent).expect("lookup").is_none());
    assert!(store.get_prompt(&absent).expect("prompt").is_none());
}

#[test]
fn artifacts_round_trip_and_are_write_once() {
    let tempdir = tempfile::tempdir().expect("tempdir");
    let store = store_in(&tempdir);
    let metadata = stored_metadata(&store);

    store.save_prompt(&metadata.id, "built prompt").expect("save prompt");
    store
        .save_response(&metadata.id, "final answer")
        .expect("save response");
    store
        .save_trace_jsonl(&metadata.id, "{\"event\":1}\n")
        .expect("save trace");

    assert_eq!(
        store.get_prompt(&metadata.id).expect("prompt").as_deref(),
        Some("built prompt")
    );
    assert_eq!(
        store.get_response(&metadata.id).expect("response").as_deref(),
        Some("final answer")
    );
    let error = store
        .save_prompt(&metadata.id, "rewritten")
        .expect_err("second write must fail");
    assert!(error.to_string().contains("already written"));
}

#[test]
fn saving_against_unknown_session_fails() {
    let tempdir = tempfile::tempdir().expect("tempdir");
    let store = store_in(&tempdir);
    let error = store
        .save_response(&generate_session_id(), "text")
        .expect_err("must fail");
    assert!(error.to_string().contains("does not exist"));
}

#[test]
fn list_sessions_sorts_newest_first_and_skips_corrupt_entries() {
    let tempdir = tempfile::tempdir().expect("tempdir");
    let store = store_in(&tempdir);

    let mut older = SessionMetadata::new(generate_session_id(), "op-old".to_string());
    older.timestamp_unix_ms = 1_000;
    store.create_session(&older).expect("create older");

    let mut newer = SessionMetadata::new(generate_session_id(), "op-new".to_string());
    newer.timestamp_unix_ms = 2_000;
    store.create_session(&newer).expect("create newer");

    // Corrupt metadata must be skipped, not fatal.
    let corrupt_id = generate_session_id();
    let corrupt_dir = store.root().join(&corrupt_id);
    std::fs::create_dir_all(&corrupt_dir).expect("mkdir");
    std::fs::write(corrupt_dir.join("metadata.json"), "{not json").expect("write");

    // Foreign directories are ignored entirely.
    std::fs::create_dir_all(store.root().join("not-a-session")).expect("mkdir");

    let listed = store.list_sessions().expect("list");
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].metadata.id, newer.id);
    assert_eq!(listed[1].metadata.id, older.id);
}

#[test]
fn cleanup_removes_exactly_the_expired_sessions() {
    let tempdir = tempfile::tempdir().expect("tempdir");
    let store = store_in(&tempdir);
    let now = 10 * 86_400_000u64;

    let mut expired = SessionMetadata::new(generate_session_id(), "op-a".to_string());
    expired.timestamp_unix_ms = now - 8 * 86_400_000;
    store.create_session(&expired).expect("create expired");

    let mut fresh = SessionMetadata::new(generate_session_id(), "op-b".to_string());
    fresh.timestamp_unix_ms = now - 86_400_000;
    store.create_session(&fresh).expect("create fresh");
    store.save_response(&fresh.id, "keep me").expect("save");

    let removed = store.cleanup_at(now);
    assert_eq!(removed, vec![expired.id.clone()]);
    assert!(store.get_session(&expired.id).expect("lookup").is_none());
    assert!(store.get_session(&fresh.id).expect("lookup").is_some());
}

#[test]
fn cleanup_survives_corrupt_metadata() {
    let tempdir = tempfile::tempdir().expect("tempdir");
    let store = store_in(&tempdir);

    let corrupt_id = generate_session_id();
    let corrupt_dir = store.root().join(&corrupt_id);
    std::fs::create_dir_all(&corrupt_dir).expect("mkdir");
    std::fs::write(corrupt_dir.join("metadata.json"), "oops").expect("write");

    let mut expired = SessionMetadata::new(generate_session_id(), "op".to_string());
    expired.timestamp_unix_ms = 0;
    store.create_session(&expired).expect("create");

    let removed = store.cleanup_at(365 * 86_400_000);
    assert_eq!(removed, vec![expired.id]);
    // Corrupt session survives (warned, not deleted blindly).
    assert!(corrupt_dir.is_dir());
}
