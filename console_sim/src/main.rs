use std::cell::RefCell;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use crossterm::cursor::Show;
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tui::backend::CrosstermBackend;
use tui::Terminal;

use node_control::edt::{Event, EDT};
use node_control::lorawan::LoraUplink;
use node_control::mkrwan::MkrWanModem;
use node_control::node::NodeControl;

use crate::battery::Battery;
use crate::dashboard::{draw_tui, Snapshot};
use crate::keyboard::Command;
use crate::sim_config::SimConfig;
use crate::sim_modem::{Network, SimModem};
use crate::sim_sensors::{SimSensors, World};

mod battery;
mod dashboard;
mod keyboard;
mod sim_config;
mod sim_modem;
mod sim_sensors;

fn init_logger(config: &SimConfig) -> anyhow::Result<()> {
    let file = File::create(&config.simulation.log_file)
        .with_context(|| format!("cannot create {}", config.simulation.log_file.display()))?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .format_timestamp_millis()
        .init();
    Ok(())
}

fn rng(config: &SimConfig, stream: u64) -> StdRng {
    match config.simulation.seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(stream)),
        None => StdRng::from_entropy(),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = SimConfig::load(config_path.as_deref())?;
    init_logger(&config)?;

    let simulation = &config.simulation;
    let world = Rc::new(RefCell::new(World::new(
        Battery::new(
            simulation.battery_capacity_mah,
            simulation.battery_charge,
            simulation.average_current_ma,
        ),
        simulation.co2_not_ready,
        simulation.sensor_faults,
        rng(&config, 0),
    )));
    let sensors = SimSensors::new(world.clone());

    let network = Rc::new(RefCell::new(Network::default()));
    let credentials = config
        .lorawan
        .credentials()
        .map_err(|e| anyhow!("lorawan: {}", e))?;
    let modem = SimModem::new(network.clone(), simulation.uplink_loss, rng(&config, 1));
    let uplink = LoraUplink::new(MkrWanModem::new(modem), config.node.region, credentials)
        .with_join_attempts(config.node.join_attempts)
        .with_confirmed(config.node.confirmed_uplinks);
    uplink
        .configure()
        .map_err(|e| anyhow!("cannot join the network: {}", e))?;

    let edt = EDT::create();
    let node = NodeControl::new(&sensors, &uplink, &edt, config.node);
    node.start();

    let mut commands = keyboard::commands();

    enable_raw_mode().context("cannot switch the terminal to raw mode")?;

    // raw mode is left below whatever happens in here
    let result: anyhow::Result<()> = async {
        let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
        terminal.clear()?;
        loop {
            world.borrow_mut().advance_to(edt.now());
            {
                let world = world.borrow();
                let network = network.borrow();
                draw_tui(
                    &mut terminal,
                    &Snapshot {
                        now_ms: edt.now(),
                        last: node.last_measurements(),
                        stats: node.stats(),
                        co2_failures: node.co2_failures(),
                        world: &world,
                        network: &network,
                    },
                )?;
            }

            match edt.poll() {
                Event::Execute { msg } => node.process_message(msg),
                Event::Wait { ms } => {
                    let real = Duration::from_secs_f64(ms as f64 / 1000.0 / simulation.time_scale);
                    tokio::select! {
                        _ = tokio::time::sleep(real) => {}
                        Some(command) = commands.recv() => match command {
                            Command::Quit => edt.exit(),
                            Command::RestartCo2 => node.restart_co2(),
                            Command::MeasureNow => node.measure_now(),
                        },
                    }
                }
                Event::Halt => break,
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    disable_raw_mode().context("cannot restore the terminal")?;
    execute!(io::stdout(), Show).context("cannot restore the cursor")?;
    result
}
