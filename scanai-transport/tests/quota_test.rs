use scanai_transport::ReassemblyQuota;

#[test]
fn shared_quota_is_visible_across_clones() {
    let quota = ReassemblyQuota::new(1_000);
    let handle = quota.clone();

    assert!(quota.reserve(600));
    assert!(!handle.reserve(500));
    assert!(handle.reserve(400));
    assert_eq!(handle.used(), 1_000);

    quota.release(600);
    assert_eq!(handle.used(), 400);
    assert!(handle.reserve(600));
}

#[test]
fn capacity_reports_the_configured_bound_not_the_usage() {
    let quota = ReassemblyQuota::new(2_048);
    quota.reserve(100);
    assert_eq!(quota.capacity(), 2_048);
}
