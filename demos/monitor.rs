//! Connects to a DFR22 unit, asks for its status and prints every event.
//!
//! Usage: `cargo run --example monitor -- <host> [port] [device-id]`

use dfr22::{ClientConfig, DeviceId, Dfr22Client, Event, TcpConnector, DEFAULT_PORT};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let mut args = std::env::args().skip(1);
    let host = args.next().ok_or("usage: monitor <host> [port] [device-id]")?;
    let port = match args.next() {
        Some(port) => port.parse()?,
        None => DEFAULT_PORT,
    };
    let device_id = match args.next() {
        Some(id) => DeviceId::new(id.parse()?)?,
        None => DeviceId::new(1)?,
    };

    let config = ClientConfig::new(host, port, device_id);
    let client = Dfr22Client::from_config(TcpConnector, &config)?;
    let mut events = client.subscribe();
    client.connect()?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                client.disconnect()?;
                break;
            }
            event = events.recv() => match event? {
                Event::ConnectionStatus(status) => {
                    println!("socket: {} ({})", status, status.code());
                    if status.is_connected() {
                        client.query_status()?;
                    }
                }
                Event::InitializedStatus(initialized) => println!("initialized: {}", initialized),
                Event::VolumeChanged(v) => println!(
                    "volume: in {} / {} dB, out {} / {} dB, mix {} {} {} {} dB",
                    v.input_1, v.input_2, v.output_1, v.output_2,
                    v.mix_1_1, v.mix_1_2, v.mix_2_1, v.mix_2_2
                ),
                Event::MuteChanged(m) => println!(
                    "mute: in {} / {}, out {} / {}",
                    m.input_1, m.input_2, m.output_1, m.output_2
                ),
                Event::FaderChanged(f) => {
                    println!("pre-mix fader: {} / {} dB", f.channel_1, f.channel_2)
                }
                Event::MixPointChanged(r) => println!(
                    "routing: 1->1 {} 1->2 {} 2->1 {} 2->2 {}",
                    r.in_1_to_out_1, r.in_1_to_out_2, r.in_2_to_out_1, r.in_2_to_out_2
                ),
            },
        }
    }

    Ok(())
}
