use radiorand_core::{Result, SdrClient};

pub fn run(server: &str) -> Result<()> {
    let client = SdrClient::connect(server)?;
    let info = client.info();
    println!("Server:     {}", client.peer());
    println!("Tuner:      {}", info.tuner);
    println!("Gain steps: {}", info.gain_count);
    println!("{info}");
    client.close()
}
