use std::io::{self, Read, Write};

use radiorand_core::{Result, SdrClient, Whitener};

const CHUNK: usize = 4096;

pub fn run(server: &str, freq: Option<u32>, format: &str, n_bytes: usize) -> Result<()> {
    let client = SdrClient::connect(server)?;
    log::info!("connected to {}: {}", client.peer(), client.info());
    if let Some(hz) = freq {
        client.set_center_freq(hz)?;
    }

    let mut source = Whitener::new(client.sample_stream()?);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut buf = vec![0u8; CHUNK];
    let mut total = 0usize;

    loop {
        if n_bytes > 0 && total >= n_bytes {
            break;
        }
        let want = if n_bytes == 0 {
            CHUNK
        } else {
            CHUNK.min(n_bytes - total)
        };

        let n = source.read(&mut buf[..want])?;
        if n == 0 {
            log::warn!("sample stream closed by server");
            break;
        }
        let data = &buf[..n];

        let write_result = match format {
            "hex" => {
                let hex: String = data.iter().map(|b| format!("{b:02x}")).collect();
                out.write_all(hex.as_bytes())
            }
            _ => out.write_all(data),
        };
        if write_result.is_err() {
            break; // Broken pipe
        }
        let _ = out.flush();
        total += n;
    }

    if format == "hex" {
        let _ = writeln!(out);
    }
    client.close()
}
