use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use log::{error, info, warn};
use tokio::runtime::{Builder, Runtime};
use tokio::signal::unix::{signal, SignalKind};
use tracing::Subscriber;
use tracing_subscriber::EnvFilter;

use crate::brain::zone::ZoneBrain;
use crate::brain::Brain;
use crate::config::Config;
use crate::io::gateway::GatewayClient;
use crate::io::IOBundle;
use crate::logging::{LoggingHandle, ReloadLogLevelError};
use crate::time_util::mytime::{RealTimeProvider, TimeProvider};

mod brain;
mod config;
mod io;
mod logging;
mod time_util;

const CONFIG_FILE: &str = "virtual_thermostat.toml";

fn main() {
    let logging_handle = logging::init_logging().expect("Failed to initialize logging");

    info!("Reading configuration from {}", CONFIG_FILE);
    let config = fs::read_to_string(CONFIG_FILE)
        .expect("Unable to read the config file. Is it missing?");
    let mut config: Config = toml::from_str(&config).expect("Error reading config file");
    config.sanitise();

    let time_provider = RealTimeProvider::default();
    let brain = ZoneBrain::new(config.get_zone().clone(), time_provider.get_utc_time());

    let gateway = GatewayClient::new(config.get_gateway(), config.get_zone());
    let io_bundle = IOBundle::new(
        gateway.clone(),
        gateway.clone(),
        gateway.clone(),
        gateway,
    );

    let rt = Builder::new_multi_thread()
        .worker_threads(2)
        .enable_time()
        .enable_io()
        .build()
        .expect("Expected to be able to make runtime");

    // A failure here is not fatal: the brain retries every tick anyway.
    match rt.block_on(io_bundle.temperature_manager().get_timeout_threshold()) {
        Ok(threshold) => info!(
            "Gateway reachable, sensor timeout is {} minutes",
            threshold.num_minutes()
        ),
        Err(err) => warn!("Gateway not reachable yet: {}", err),
    }

    spawn_filter_reload(&rt, logging_handle);

    main_loop(brain, io_bundle, rt, time_provider);
}

/// Re-read logging.env on SIGHUP so the log level can be changed without a
/// restart.
fn spawn_filter_reload<S>(rt: &Runtime, logging_handle: LoggingHandle<EnvFilter, S>)
where
    S: Subscriber + Send + Sync + 'static,
{
    rt.spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(stream) => stream,
            Err(err) => {
                warn!("Not listening for SIGHUP log filter reloads: {}", err);
                return;
            }
        };
        while hangup.recv().await.is_some() {
            match logging::reload_log_level(&logging_handle) {
                Ok(filter) => info!("Reloaded log filter: {}", filter),
                Err(ReloadLogLevelError::InvalidFilter(err)) => {
                    warn!("Not reloading log filter: {}", err)
                }
                Err(ReloadLogLevelError::ReloadFailed(err)) => {
                    warn!("Failed to reload log filter: {}", err)
                }
            }
        }
    });
}

fn main_loop(
    mut brain: impl Brain,
    mut io_bundle: IOBundle,
    rt: Runtime,
    time_provider: impl TimeProvider,
) {
    let should_exit = Arc::new(AtomicBool::new(false));

    {
        let should_exit = should_exit.clone();
        ctrlc::set_handler(move || {
            should_exit.store(true, Ordering::Relaxed);
        })
        .expect("Failed to attach kill handler.");
    }

    info!("Beginning main loop.");
    loop {
        if should_exit.load(Ordering::Relaxed) {
            info!("Received termination signal - stopping safely...");
            shutdown(rt, io_bundle);
            info!("Stopped safely.");
            return;
        }

        if let Err(failure) = brain.run(&rt, &mut io_bundle, &time_provider) {
            error!("Brain failure: {}", failure);
            if failure.get_corrective_actions().is_heater_state_unknown() {
                info!("Attempting to get heaters back to a known (off) state");
                if let Err(err) = rt.block_on(io_bundle.heater_control().try_set_heaters(false)) {
                    error!("Failed to switch heaters off: {}", err);
                }
            }
        }

        sleep(Duration::from_secs(10));
    }
}

fn shutdown(rt: Runtime, mut io_bundle: IOBundle) {
    if let Err(err) = rt.block_on(io_bundle.heater_control().try_set_heaters(false)) {
        error!("FAILED TO SWITCH OFF HEATERS: {}", err);
    }
    rt.shutdown_background();
}
