//! End-to-end tests of the capture worker against the simulated camera and a
//! stub encoder process.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tethercast_device::{SettingInfo, SimCamera};
use tethercast_foundation::{SessionState, Termination};
use tethercast_stream::worker::{AUTOFOCUS_DRIVE, FOCUS_NEUTRAL, MANUAL_FOCUS_DRIVE};
use tethercast_stream::{
    control_channel, CaptureWorker, Command, ControlHandle, EncoderLauncher, Facet, Outcome,
    SettingFacet, WorkerConfig, WorkerHandle,
};

fn synth_jpeg(width: u32, height: u32) -> Vec<u8> {
    let mut buf = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(image::RgbImage::new(width, height))
        .write_to(&mut buf, image::ImageOutputFormat::Jpeg(85))
        .unwrap();
    buf.into_inner()
}

fn stub_encoder() -> EncoderLauncher {
    EncoderLauncher::custom("sh", vec!["-c".into(), "cat>/dev/null".into()])
}

fn worker_config() -> WorkerConfig {
    WorkerConfig {
        sink: "/dev/video9".into(),
        width: 1280,
        height: 720,
        preserve_aspect: true,
    }
}

fn spawn_worker(
    camera: &SimCamera,
    launcher: EncoderLauncher,
) -> (ControlHandle, WorkerHandle) {
    let (control, endpoint) = control_channel();
    let worker = CaptureWorker::new(
        Arc::new(camera.clone()),
        launcher,
        worker_config(),
        endpoint,
    )
    .spawn()
    .unwrap();
    (control, worker)
}

fn wait_outcome(control: &ControlHandle, timeout: Duration) -> Option<Outcome> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Some(outcome) = control.try_take() {
            return Some(outcome);
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    None
}

#[test]
fn shutdown_acknowledges_and_tears_down() {
    let camera = SimCamera::new(synth_jpeg(64, 48));
    let (control, worker) = spawn_worker(&camera, stub_encoder());

    let outcome = control.request(Command::Shutdown).unwrap();
    assert_eq!(outcome, Outcome::Done);

    let session = worker.session().clone();
    worker.join();
    assert_eq!(
        session.current(),
        SessionState::Terminated(Termination::CleanShutdown)
    );
}

#[test]
fn device_loss_pushes_abort() {
    let camera = SimCamera::new(synth_jpeg(64, 48)).fail_frames_after(5);
    let (control, worker) = spawn_worker(&camera, stub_encoder());

    match wait_outcome(&control, Duration::from_secs(5)) {
        Some(Outcome::Abort(reason)) => assert!(reason.contains("tether"), "{reason}"),
        other => panic!("expected abort, got {:?}", other),
    }
    let session = worker.session().clone();
    worker.join();
    assert!(matches!(
        session.current(),
        SessionState::Terminated(Termination::DeviceLost(_))
    ));
}

#[test]
fn dead_encoder_pushes_restart() {
    let camera = SimCamera::new(synth_jpeg(64, 48));
    let (control, worker) = spawn_worker(&camera, EncoderLauncher::custom("true", Vec::new()));

    match wait_outcome(&control, Duration::from_secs(5)) {
        Some(Outcome::Restart) => {}
        other => panic!("expected restart, got {:?}", other),
    }
    let session = worker.session().clone();
    worker.join();
    assert_eq!(
        session.current(),
        SessionState::Terminated(Termination::PipeBroken)
    );
}

#[test]
fn sequential_requests_get_matching_replies() {
    let camera = SimCamera::new(synth_jpeg(64, 48))
        .with_setting(SettingInfo {
            name: "iso".into(),
            current: "100".into(),
            choices: vec!["100".into(), "200".into(), "400".into()],
        })
        .with_setting(SettingInfo {
            name: "aperture".into(),
            current: "5.6".into(),
            choices: vec!["4".into(), "5.6".into(), "8".into()],
        });
    let (control, worker) = spawn_worker(&camera, stub_encoder());

    let reply = control
        .request(Command::GetSetting {
            name: "iso".into(),
            facet: Some(Facet::Current),
        })
        .unwrap();
    assert_eq!(reply, Outcome::Value(SettingFacet::Current("100".into())));

    let reply = control
        .request(Command::GetSetting {
            name: "aperture".into(),
            facet: Some(Facet::Choices),
        })
        .unwrap();
    assert_eq!(
        reply,
        Outcome::Value(SettingFacet::Choices(vec![
            "4".into(),
            "5.6".into(),
            "8".into()
        ]))
    );

    // No facet: the full setting comes back.
    let reply = control
        .request(Command::GetSetting {
            name: "iso".into(),
            facet: None,
        })
        .unwrap();
    match reply {
        Outcome::Value(SettingFacet::Full(info)) => {
            assert_eq!(info.current, "100");
            assert_eq!(info.choices.len(), 3);
        }
        other => panic!("expected full setting, got {:?}", other),
    }

    assert_eq!(control.request(Command::Shutdown).unwrap(), Outcome::Done);
    worker.join();
}

#[test]
fn failed_setting_writes_never_surface() {
    let camera = SimCamera::new(synth_jpeg(64, 48)).with_setting(SettingInfo {
        name: "iso".into(),
        current: "100".into(),
        choices: vec!["100".into(), "200".into()],
    });
    let (control, worker) = spawn_worker(&camera, stub_encoder());

    control
        .send(Command::UpdateSetting("iso:200".into()))
        .unwrap();
    control
        .send(Command::UpdateSetting("bogus:1".into()))
        .unwrap();
    control
        .send(Command::UpdateSetting("colonless".into()))
        .unwrap();

    // A later query returning normally proves the worker survived the bad
    // writes and applied the good one first.
    let reply = control
        .request(Command::GetSetting {
            name: "iso".into(),
            facet: Some(Facet::Current),
        })
        .unwrap();
    assert_eq!(reply, Outcome::Value(SettingFacet::Current("200".into())));

    let writes = camera.writes();
    assert!(writes.contains(&("iso".into(), "200".into())));
    assert!(writes.contains(&("bogus".into(), "1".into())));
    assert!(writes.contains(&("colonless".into(), "".into())));

    assert_eq!(control.request(Command::Shutdown).unwrap(), Outcome::Done);
    worker.join();
}

#[test]
fn focus_commands_pulse_and_reset() {
    let camera = SimCamera::new(synth_jpeg(64, 48)).with_setting(SettingInfo {
        name: MANUAL_FOCUS_DRIVE.into(),
        current: FOCUS_NEUTRAL.into(),
        choices: vec!["Near 1".into(), FOCUS_NEUTRAL.into(), "Far 1".into()],
    });
    let (control, worker) = spawn_worker(&camera, stub_encoder());

    control.send(Command::AutofocusStart).unwrap();
    control
        .send(Command::FocusStep("Near 1".into()))
        .unwrap();

    // Synchronize: once this answers, the sends above were dispatched.
    control
        .request(Command::GetSetting {
            name: MANUAL_FOCUS_DRIVE.into(),
            facet: Some(Facet::Current),
        })
        .unwrap();

    let writes = camera.writes();
    assert!(writes.contains(&(AUTOFOCUS_DRIVE.into(), "1".into())));
    let pulse = writes
        .iter()
        .position(|w| *w == (MANUAL_FOCUS_DRIVE.into(), "Near 1".into()))
        .expect("focus step written");
    assert_eq!(
        writes.get(pulse + 1),
        Some(&(MANUAL_FOCUS_DRIVE.into(), FOCUS_NEUTRAL.into()))
    );

    assert_eq!(control.request(Command::Shutdown).unwrap(), Outcome::Done);
    worker.join();
}

#[test]
fn unknown_setting_query_answers_with_empty_facet() {
    let camera = SimCamera::new(synth_jpeg(64, 48));
    let (control, worker) = spawn_worker(&camera, stub_encoder());

    let reply = control
        .request(Command::GetSetting {
            name: "whitebalance".into(),
            facet: Some(Facet::Choices),
        })
        .unwrap();
    assert_eq!(reply, Outcome::Value(SettingFacet::Choices(Vec::new())));

    assert_eq!(control.request(Command::Shutdown).unwrap(), Outcome::Done);
    worker.join();
}
