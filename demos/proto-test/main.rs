use std::{env, process::exit, time::Duration};

use tokio::time::Instant;
use visa_backend::{
    attribute::{AttributeTarget, AttributeValue},
    manager::ResourceManager,
    resource::OpenOptions,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.len() != 2 {
        println!("Usage: proto-test <resource>");
        println!("  <resource>: a VISA resource string, e.g.");
        println!("    TCPIP0::192.0.2.10::INSTR");
        println!("    TCPIP0::192.0.2.10::hislip0::INSTR");
        println!("    TCPIP0::192.0.2.10::5025::SOCKET");
        println!("    USB0::0x1234::0x5678::SN1::INSTR");
        println!("    ASRL/dev/ttyUSB0::INSTR");
        exit(1);
    }

    let resource = &args[1];

    let mut manager = ResourceManager::new();
    let handle = manager.open(resource, OpenOptions::default()).await?;
    let session = manager.get_mut(handle)?;

    let start = Instant::now();
    session.write(b"*IDN?\n").await?;
    let stop = Instant::now();
    println!("Write: {} ms", (stop - start).as_secs_f64() * 1000.);

    let start = Instant::now();
    let (data, reason) = session.read(256).await?;
    let stop = Instant::now();
    println!("Read: {} ms ({reason:?})", (stop - start).as_secs_f64() * 1000.);
    println!("  Data: {}", String::from_utf8_lossy(&data));

    session.write(b"*IDN?\n").await?;
    let start = Instant::now();
    let resp = session.read(10).await;
    let stop = Instant::now();
    println!("Read (10 bytes): {} ms", (stop - start).as_secs_f64() * 1000.);
    if let Err(e) = resp {
        println!("  Error: {e}");
    }

    session.set_attribute(AttributeValue::Timeout(Duration::from_secs(1))).ok();
    let start = Instant::now();
    let resp = session.read(256).await;
    let stop = Instant::now();
    println!(
        "Read (1 sec timeout, no data): {} ms",
        (stop - start).as_secs_f64() * 1000.
    );
    if let Err(e) = resp {
        println!("  Error: {e}");
    }

    manager.close(handle).await?;
    Ok(())
}
