mod error;
mod observer;
mod transport;

use std::net::Ipv4Addr;

use argh::FromArgs;
use signal_hook::consts::SIGINT;
use signal_hook::iterator::Signals;

use error::Error;
use observer::LoggingObserver;
use transport::{UdpTransport, LIMITED_BROADCAST};

/// Run a SyncJams node: a consensus metronome, last-writer-wins state, and
/// reliable gossip messaging over UDP broadcast.
#[derive(FromArgs)]
struct Args {
    /// UDP port to bind and broadcast on
    #[argh(option, default = "syncjams_core::constants::PORT")]
    port: u16,

    /// initial tempo in beats per minute
    #[argh(option, default = "syncjams_core::constants::DEFAULT_BPM")]
    bpm: f64,

    /// additional broadcast destination to send to, e.g. a subnet broadcast
    /// address (may be repeated); limited broadcast is always included
    #[argh(option)]
    destination: Vec<Ipv4Addr>,
}

fn main() {
    env_logger::init();
    let args: Args = argh::from_env();

    if let Err(err) = run(args) {
        log::error!("{err}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Error> {
    let mut destinations = vec![LIMITED_BROADCAST];
    destinations.extend(args.destination.iter().copied());

    let transport = UdpTransport::bind(args.port, destinations.clone())?;
    let clock = syncjams_core::SystemClock::new();
    let config = syncjams_core::Config::new().with_state("/BPM", args.bpm);
    let mut engine = syncjams_core::Engine::new(config, transport, clock, LoggingObserver)?;

    log::info!(
        "node {} listening on 0.0.0.0:{}, broadcasting to {:?} at {} bpm",
        engine.node_id(),
        args.port,
        destinations,
        args.bpm
    );

    let handle = engine.handle();
    let mut signals = Signals::new(&[SIGINT])?;
    std::thread::spawn(move || {
        if signals.forever().next().is_some() {
            log::info!("received interrupt, leaving");
            handle.close();
        }
    });

    engine.serve_forever();
    Ok(())
}
