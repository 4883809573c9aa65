use shrike::bridge::NativeBridge;
use shrike::cli::CliOverrides;
use shrike::compiler::CargoModuleLoader;
use shrike::config::HostConfig;
use shrike::driver::FrameDriver;
use shrike::engine::EngineLibrary;
use shrike::host::ScriptHost;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;
use std::time::Instant;

fn main() -> ExitCode {
    let overrides = match CliOverrides::parse_from_env() {
        Ok(parsed) => parsed,
        Err(err) => {
            eprintln!("[cli] {err}");
            return ExitCode::from(2);
        }
    };
    let config_path =
        overrides.config_path().cloned().unwrap_or_else(|| PathBuf::from("shrike.json"));
    let mut config = HostConfig::load_or_default(&config_path);
    overrides.apply(&mut config);

    let Some(engine_path) = config.engine_library.clone() else {
        eprintln!("[cli] no engine library configured; pass --engine-library or set it in the config");
        return ExitCode::from(2);
    };
    let engine = match EngineLibrary::open(&engine_path) {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("[engine] {err:?}");
            return ExitCode::FAILURE;
        }
    };

    // The engine can own the whole process loop instead; in that mode we
    // hand over and return its exit code, the way the original launcher
    // forwards its arguments to the engine's run entry point.
    if overrides.run_engine() {
        let args: Vec<String> = std::env::args().collect();
        return match engine.run(&args) {
            Ok(code) => {
                println!("[engine] run returned {code}");
                ExitCode::from(code.clamp(0, 255) as u8)
            }
            Err(err) => {
                eprintln!("[engine] {err:?}");
                ExitCode::FAILURE
            }
        };
    }

    let bridge = Rc::new(NativeBridge::new(Rc::new(engine)));
    let loader = CargoModuleLoader::new(&config.stage_dir, &config.host_crate_dir, config.offline);
    let mut host = ScriptHost::new(
        bridge,
        Box::new(loader),
        &config.scripts_dir,
        &config.source_extension,
        config.debounce(),
    );
    host.reload();

    let mut driver = FrameDriver::new(config.target_fps);
    loop {
        let frame_started = Instant::now();
        driver.run_frame(&mut host, &mut |_dt| {
            // Engine ticks on its own thread in this integration; nothing to
            // advance from here.
        });
        driver.idle(frame_started);
    }
}
