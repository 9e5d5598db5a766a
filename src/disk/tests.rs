use super::*;
use crate::testutil::{MockExec, MockReply, RecordingContext};

const FAST: RetrySchedule = RetrySchedule::new(&[0.0, 0.0]);

const LINK_OUT: &str =
    "Success: Userid LINUX01 vdev 0101 linked at ad35 device name dasde\n";

fn spec_3390(fs: FsKind) -> DiskSpec {
    DiskSpec::new("0101", "w", DiskGeometry::Eckd3390, fs)
}

fn provisioner(mock: &MockExec) -> DiskProvisioner<'_> {
    DiskProvisioner::new(mock).with_schedule(FAST)
}

#[test]
fn eckd_swap_runs_full_tool_chain() {
    let mock = MockExec::new();
    mock.stub("linkdiskandbringonline", MockReply::Ok(LINK_OUT.into()));
    let ctx = RecordingContext::new("LINUX01");

    let record = provisioner(&mock).provision(&ctx, &spec_3390(FsKind::Swap));
    assert!(record.is_ok());

    let calls = mock.calls();
    assert!(calls.iter().any(|c| c.contains("dasdfmt") && c.contains("/dev/dasde")));
    assert!(calls.iter().any(|c| c.contains("fdasd -a /dev/dasde")));
    assert!(calls.iter().any(|c| c.contains("mkswap /dev/dasde1")));
    assert!(calls.iter().any(|c| c.contains("blockdev --flushbufs /dev/dasde")));
    assert!(calls.iter().any(|c| c.contains("offlinediskanddetach LINUX01 0101")));
    assert!(ctx.noted().iter().any(|l| l == "File system: swap is installed."));
}

#[test]
fn fba_uses_fdisk_instead_of_dasd_tools() {
    let mock = MockExec::new();
    mock.stub("linkdiskandbringonline", MockReply::Ok(LINK_OUT.into()));
    let ctx = RecordingContext::new("LINUX01");

    let spec = DiskSpec::new("0101", "w", DiskGeometry::Fba9336, FsKind::Xfs);
    let record = provisioner(&mock).provision(&ctx, &spec);
    assert!(record.is_ok());

    let calls = mock.calls();
    let fdisk_calls = calls.iter().filter(|c| c.contains("fdisk /dev/dasde")).count();
    assert_eq!(fdisk_calls, 2);
    assert!(!calls.iter().any(|c| c.contains("dasdfmt")));
    assert!(calls.iter().any(|c| c.contains("mkfs.xfs -f /dev/dasde1")));
}

#[test]
fn named_fs_goes_through_generic_mkfs() {
    let mock = MockExec::new();
    mock.stub("linkdiskandbringonline", MockReply::Ok(LINK_OUT.into()));
    let ctx = RecordingContext::new("LINUX01");

    let spec = spec_3390(FsKind::Named("ext4".into()));
    let record = provisioner(&mock).provision(&ctx, &spec);
    assert!(record.is_ok());
    assert!(mock.calls().iter().any(|c| c.contains("mkfs -F -t ext4 /dev/dasde1")));
    assert!(ctx.noted().iter().any(|l| l == "File system: ext4 is installed."));
}

#[test]
fn acquisition_failure_still_detaches_but_skips_flush() {
    let mock = MockExec::new();
    mock.stub(
        "linkdiskandbringonline",
        MockReply::Exit(1, "HCPLNM101E disk not found".into()),
    );
    let ctx = RecordingContext::new("LINUX01");

    let record = provisioner(&mock).provision(&ctx, &spec_3390(FsKind::Swap));
    assert_eq!(record.overall_rc, 4);
    assert_eq!(record.rs, 415);
    assert!(ctx.announced().iter().any(|l| l.contains("VMB0415E")));

    let calls = mock.calls();
    // Exhausts the schedule before giving up.
    let links = calls.iter().filter(|c| c.contains("linkdiskandbringonline")).count();
    assert_eq!(links, FAST.max_attempts());
    assert!(!calls.iter().any(|c| c.contains("blockdev")));
    let detaches = calls.iter().filter(|c| c.contains("offlinediskanddetach")).count();
    assert_eq!(detaches, 1);
}

#[test]
fn fs_failure_keeps_its_codes_and_releases_once() {
    let mock = MockExec::new();
    mock.stub("linkdiskandbringonline", MockReply::Ok(LINK_OUT.into()));
    mock.stub("mkswap", MockReply::Exit(1, "mkswap: cannot open".into()));
    let ctx = RecordingContext::new("LINUX01");

    let record = provisioner(&mock).provision(&ctx, &spec_3390(FsKind::Swap));
    assert_eq!(record.overall_rc, 4);
    assert_eq!(record.rs, 415);
    assert!(record.response.contains("mkswap: cannot open"));

    let calls = mock.calls();
    let detaches = calls.iter().filter(|c| c.contains("offlinediskanddetach")).count();
    assert_eq!(detaches, 1);
    assert!(!ctx.noted().iter().any(|l| l.contains("is installed")));
}

#[test]
fn detach_failure_overrides_success() {
    let mock = MockExec::new();
    mock.stub("linkdiskandbringonline", MockReply::Ok(LINK_OUT.into()));
    mock.stub(
        "offlinediskanddetach",
        MockReply::Exit(1, "HCPDTD040E device busy".into()),
    );
    let ctx = RecordingContext::new("LINUX01");

    let record = provisioner(&mock).provision(&ctx, &spec_3390(FsKind::Swap));
    assert_eq!(record.overall_rc, 4);
    assert_eq!(record.rs, 415);
    assert!(record.response.contains("device busy"));
}

#[test]
fn detach_failure_is_appended_after_an_earlier_failure() {
    let mock = MockExec::new();
    mock.stub("linkdiskandbringonline", MockReply::Ok(LINK_OUT.into()));
    mock.stub("mkswap", MockReply::Exit(1, "mkswap: cannot open".into()));
    mock.stub(
        "offlinediskanddetach",
        MockReply::Exit(1, "HCPDTD040E device busy".into()),
    );
    let ctx = RecordingContext::new("LINUX01");

    let record = provisioner(&mock).provision(&ctx, &spec_3390(FsKind::Swap));
    // The first failure stays the reported outcome.
    assert_eq!(record.rs, 415);
    assert!(record.response.contains("mkswap: cannot open"));
    assert!(record.response.contains("device busy"));
}

#[test]
fn flush_failure_is_a_warning_only() {
    let mock = MockExec::new();
    mock.stub("linkdiskandbringonline", MockReply::Ok(LINK_OUT.into()));
    mock.stub("blockdev", MockReply::Exit(1, "no such device".into()));
    let ctx = RecordingContext::new("LINUX01");

    let record = provisioner(&mock).provision(&ctx, &spec_3390(FsKind::Swap));
    assert!(record.is_ok());
    assert!(ctx.warned().iter().any(|l| l.contains("flush")));
}

#[test]
fn missing_marker_reports_and_still_detaches() {
    let mock = MockExec::new();
    mock.stub("linkdiskandbringonline", MockReply::Ok("Done.\n".into()));
    let ctx = RecordingContext::new("LINUX01");

    let record = provisioner(&mock).provision(&ctx, &spec_3390(FsKind::Swap));
    assert_eq!(record.overall_rc, 4);
    assert_eq!(record.rs, 417);
    assert!(ctx.announced().iter().any(|l| l.contains("VMB0417E")));
    assert!(mock.calls().iter().any(|c| c.contains("offlinediskanddetach")));
}

#[test]
fn short_marker_line_reports_token_shortage() {
    let mock = MockExec::new();
    mock.stub("linkdiskandbringonline", MockReply::Ok("Success: too short\n".into()));
    let ctx = RecordingContext::new("LINUX01");

    let record = provisioner(&mock).provision(&ctx, &spec_3390(FsKind::Swap));
    assert_eq!(record.rs, 416);
}

#[test]
fn scrape_takes_the_tenth_word_after_the_marker() {
    let out = "Success: Userid maint vdev 193 linked at ad35 device name dasdh\n";
    let device = scrape_device("cmd", out).expect("marker line must parse");
    assert_eq!(device, "dasdh");
}

#[test]
fn scrape_ignores_text_before_the_marker() {
    let out = "linking... Success: Userid maint vdev 193 linked at ad35 device name dasdh\n";
    let device = scrape_device("cmd", out).expect("marker line must parse");
    assert_eq!(device, "dasdh");
}

#[test]
fn format_failure_halts_without_retry() {
    let mock = MockExec::new();
    mock.stub("linkdiskandbringonline", MockReply::Ok(LINK_OUT.into()));
    mock.stub("dasdfmt", MockReply::Exit(1, "dasdfmt: I/O error".into()));
    let ctx = RecordingContext::new("LINUX01");

    let record = provisioner(&mock).provision(&ctx, &spec_3390(FsKind::Swap));
    assert_eq!(record.rs, 415);

    let calls = mock.calls();
    let formats = calls.iter().filter(|c| c.contains("dasdfmt")).count();
    assert_eq!(formats, 1);
    assert!(!calls.iter().any(|c| c.contains("fdasd")));
    assert!(calls.iter().any(|c| c.contains("offlinediskanddetach")));
}

#[test]
fn fba_partition_create_retries_but_wipe_does_not() {
    let mock = MockExec::new();
    mock.stub("linkdiskandbringonline", MockReply::Ok(LINK_OUT.into()));
    mock.stub_seq(
        "printf 'n",
        vec![
            MockReply::Exit(1, "fdisk: partition table not visible".into()),
            MockReply::Ok("Created a new partition 1.\n".into()),
        ],
    );
    let ctx = RecordingContext::new("LINUX01");

    let spec = DiskSpec::new("0101", "w", DiskGeometry::Fba9336, FsKind::Xfs);
    let record = provisioner(&mock).provision(&ctx, &spec);
    assert!(record.is_ok());

    let calls = mock.calls();
    let wipes = calls.iter().filter(|c| c.contains("printf 'g")).count();
    let creates = calls.iter().filter(|c| c.contains("printf 'n")).count();
    assert_eq!(wipes, 1);
    assert_eq!(creates, 2);
}

#[test]
fn link_retries_until_device_appears() {
    let mock = MockExec::new();
    mock.stub_seq(
        "linkdiskandbringonline",
        vec![
            MockReply::Exit(1, "device not ready".into()),
            MockReply::Ok(LINK_OUT.into()),
        ],
    );
    let ctx = RecordingContext::new("LINUX01");

    let record = provisioner(&mock).provision(&ctx, &spec_3390(FsKind::Swap));
    assert!(record.is_ok());
    let links = mock
        .calls()
        .iter()
        .filter(|c| c.contains("linkdiskandbringonline"))
        .count();
    assert_eq!(links, 2);
    // The quiet first failure is never announced.
    assert!(ctx.announced().is_empty());
}

#[test]
fn disable_of_offline_device_counts_as_success() {
    let mock = MockExec::new();
    mock.stub(
        "iucvclnt",
        MockReply::Exit(1, "Return code (8), Reason code (1).".into()),
    );
    let ctx = RecordingContext::new("MAINT");

    let record = disk_state_with(&mock, &ctx, "LINUX01", "0101", DiskState::Disable, &FAST);
    assert!(record.is_ok());
    // Treated as done on the first probe.
    assert_eq!(mock.calls().len(), 1);
}

#[test]
fn enable_does_not_share_the_offline_special_case() {
    let mock = MockExec::new();
    mock.stub(
        "iucvclnt",
        MockReply::Exit(1, "Return code (8), Reason code (1).".into()),
    );
    let ctx = RecordingContext::new("MAINT");

    let record = disk_state_with(&mock, &ctx, "LINUX01", "0101", DiskState::Enable, &FAST);
    assert!(!record.is_ok());
    assert_eq!(record.overall_rc, 2);
    assert_eq!(mock.calls().len(), FAST.max_attempts());
}

#[test]
fn disk_state_change_retries_through_transport_failures() {
    let mock = MockExec::new();
    mock.stub_seq(
        "iucvclnt",
        vec![
            MockReply::Exit(1, "Return code (8), Reason code (2).".into()),
            MockReply::Ok("done\n".into()),
        ],
    );
    let ctx = RecordingContext::new("MAINT");

    let record = disk_state_with(&mock, &ctx, "LINUX01", "0101", DiskState::Enable, &FAST);
    assert!(record.is_ok());
    assert_eq!(mock.calls().len(), 2);
    assert!(mock.calls()[0].contains("chccwdev -e 0101"));
}
