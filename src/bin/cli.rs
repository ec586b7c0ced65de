use anyhow::{anyhow, bail, Context, Result};
use camgent::commands::{dispatch_settings, MethodCall, GET_NATIVE_CAMERA_SETTINGS};
use camgent::testing::{wait_for, VirtualBackend, VirtualDeviceSpec, VirtualRenderTarget};
use camgent::{
    ApplyOutcome, CamgentConfig, CameraBackend, CameraController, FileStorage, SessionPhase, Size,
};
use serde_json::{json, Map, Value};
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const STREAM_TIMEOUT: Duration = Duration::from_secs(2);

fn main() -> Result<()> {
    camgent::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: camgent-cli <devices|settings|capture> [args]");
        std::process::exit(1);
    }

    let backend = virtual_backend();
    match args[1].as_str() {
        "devices" => cmd_devices(&backend, &args),
        "settings" => cmd_settings(&backend, &args),
        "capture" => cmd_capture(backend, &args),
        other => {
            eprintln!("Unknown command: {}", other);
            std::process::exit(1);
        }
    }
}

fn virtual_backend() -> VirtualBackend {
    VirtualBackend::new(vec![VirtualDeviceSpec::rear("0"), VirtualDeviceSpec::front("1")])
}

fn wants_json(args: &[String]) -> bool {
    args.iter().any(|a| a == "--json")
}

fn cmd_devices(backend: &VirtualBackend, args: &[String]) -> Result<()> {
    let mut devices = Vec::new();
    for id in backend.device_ids()? {
        let raw = backend.characteristics(&id)?;
        devices.push(json!({ "id": id, "facing": raw.facing }));
    }

    if wants_json(args) {
        println!("{}", serde_json::to_string(&devices)?);
    } else {
        for d in &devices {
            println!("{}: {}", d["id"].as_str().unwrap_or("?"), d["facing"]);
        }
    }
    Ok(())
}

fn cmd_settings(backend: &VirtualBackend, args: &[String]) -> Result<()> {
    let Some(device_id) = args.get(2) else {
        eprintln!("Usage: camgent-cli settings <device_id> [--json]");
        std::process::exit(1);
    };

    let call = MethodCall::new(GET_NATIVE_CAMERA_SETTINGS, json!({ "cameraId": device_id }));
    let reply = dispatch_settings(backend, &call);
    if wants_json(args) {
        println!("{}", serde_json::to_string(&reply)?);
    } else {
        println!("{:?}", reply);
    }
    Ok(())
}

struct CaptureArgs {
    count: usize,
    out: Option<String>,
    settings: Option<Map<String, Value>>,
    zoom: Option<f32>,
    exposure: Option<f32>,
    json: bool,
}

fn parse_capture_args(args: &[String]) -> Result<CaptureArgs> {
    let mut parsed = CaptureArgs {
        count: 1,
        out: None,
        settings: None,
        zoom: None,
        exposure: None,
        json: false,
    };

    let mut i = 2;
    while i < args.len() {
        let flag = args[i].as_str();
        let mut value = || {
            i += 1;
            args.get(i)
                .cloned()
                .ok_or_else(|| anyhow!("{} needs a value", flag))
        };
        match flag {
            "--count" => parsed.count = value()?.parse().context("--count")?,
            "--out" => parsed.out = Some(value()?),
            "--settings" => {
                let text = value()?;
                let settings: Value = serde_json::from_str(&text).context("--settings")?;
                match settings {
                    Value::Object(map) => parsed.settings = Some(map),
                    _ => bail!("--settings must be a JSON object"),
                }
            }
            "--zoom" => parsed.zoom = Some(value()?.parse().context("--zoom")?),
            "--exposure" => parsed.exposure = Some(value()?.parse().context("--exposure")?),
            "--json" => parsed.json = true,
            other => bail!("unknown capture option {}", other),
        }
        i += 1;
    }
    Ok(parsed)
}

fn report(what: &str, outcome: ApplyOutcome) {
    match outcome {
        ApplyOutcome::Applied { revision, ignored } => {
            for err in ignored {
                eprintln!("{}: skipped {}", what, err);
            }
            log::info!("{} applied (revision {})", what, revision);
        }
        ApplyOutcome::Dropped => eprintln!("{}: dropped, camera not streaming", what),
        ApplyOutcome::Failed(e) => eprintln!("{}: {}", what, e),
    }
}

fn cmd_capture(backend: VirtualBackend, args: &[String]) -> Result<()> {
    let opts = parse_capture_args(args)?;

    let mut config = CamgentConfig::load_or_default();
    if let Some(out) = &opts.out {
        config.capture.storage_directory = out.clone();
    }
    let storage = Arc::new(FileStorage::from_config(&config.capture));

    let controller = CameraController::builder(Arc::new(backend))
        .storage(storage)
        .config(config)
        .build()?;

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = interrupted.clone();
        ctrlc::set_handler(move || interrupted.store(true, Ordering::SeqCst))
            .context("installing interrupt handler")?;
    }

    controller.open(Arc::new(VirtualRenderTarget::new(Size::new(1280, 720))))?;
    if !wait_for(STREAM_TIMEOUT, || controller.phase() == SessionPhase::Streaming) {
        controller.pause();
        bail!("camera did not start streaming (phase {})", controller.phase());
    }

    if let Some(settings) = &opts.settings {
        report("settings", controller.apply_settings(settings));
    }
    if let Some(zoom) = opts.zoom {
        report("zoom", controller.set_zoom(zoom));
    }
    if let Some(exposure) = opts.exposure {
        report("exposure", controller.set_exposure_compensation(exposure));
    }

    let mut failures = 0;
    for n in 0..opts.count {
        if interrupted.load(Ordering::SeqCst) {
            eprintln!("Interrupted after {} captures", n);
            break;
        }
        let result = controller.capture().wait();
        if opts.json {
            let line = match &result {
                Ok(location) => json!({ "status": "success", "result": location }),
                Err(e) => json!({ "status": "error", "code": e.code(), "message": e.to_string() }),
            };
            println!("{}", line);
        } else {
            match &result {
                Ok(location) => println!("Saved: {}", location),
                Err(e) => println!("Failed: {} ({})", e, e.code()),
            }
        }
        if result.is_err() {
            failures += 1;
        }
    }

    controller.pause();
    if failures > 0 {
        bail!("{} of {} captures failed", failures, opts.count);
    }
    Ok(())
}
