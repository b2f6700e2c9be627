//! Minimal scriptable viewer. Opens a data channel, learns its assigned
//! identifier, issues one control request against it from a second
//! connection, and prints every decoded record.

use clap::Parser;
use shared::wire;
use std::error::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    #[clap(short, long, default_value = "3333")]
    port: u16,
    /// View size as w,h
    #[clap(short, long, default_value = "400,400")]
    view: String,
    /// Frame rectangle top point as x,y
    #[clap(short = 't', long, default_value = "0,0")]
    frame_top: String,
    /// Frame rectangle bottom point as x,y
    #[clap(short = 'b', long, default_value = "1000,1000")]
    frame_bottom: String,
    /// Quantization grid size
    #[clap(short, long, default_value = "1")]
    resolution: u32,
    /// Group selection mask
    #[clap(short, long, default_value_t = u32::MAX)]
    mask: u32,
}

fn parse_pair(text: &str) -> Result<(i32, i32), Box<dyn Error>> {
    let (x, y) = text
        .split_once(',')
        .ok_or_else(|| format!("expected x,y but got '{text}'"))?;
    Ok((x.trim().parse()?, y.trim().parse()?))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = Args::parse();
    let address = format!("{}:{}", args.host, args.port);
    let (view_w, view_h) = parse_pair(&args.view)?;
    let (top_x, top_y) = parse_pair(&args.frame_top)?;
    let (bot_x, bot_y) = parse_pair(&args.frame_bottom)?;

    // data channel: learn our assigned identifier from the first chunk
    let data = TcpStream::connect(&address).await?;
    let (data_read, mut data_write) = data.into_split();
    let mut data_reader = BufReader::new(data_read);
    data_write.write_all(b"GET /data HTTP/1.1\r\n\r\n").await?;
    read_head(&mut data_reader).await?;
    let part = read_chunk(&mut data_reader)
        .await?
        .ok_or("server closed the data channel")?;
    let payload = wire::part_payload(&part).ok_or("malformed identity chunk")?;
    let id: u32 = String::from_utf8_lossy(payload).trim().parse()?;
    println!("data channel registered as {id}");

    // control connection addressing the data channel by its id
    let control = TcpStream::connect(&address).await?;
    let (control_read, mut control_write) = control.into_split();
    let mut control_reader = BufReader::new(control_read);
    let request = format!(
        "GET /control/{id}/{view_w}/{view_h}/{top_x}/{top_y}/{bot_x}/{bot_y}/{}/{} HTTP/1.1\r\n\r\n",
        args.resolution, args.mask
    );
    control_write.write_all(request.as_bytes()).await?;
    read_head(&mut control_reader).await?;
    println!("control request acknowledged");

    // drain the resulting transmission until the stream goes quiet
    let mut total = 0usize;
    while let Ok(next) = timeout(Duration::from_secs(2), read_chunk(&mut data_reader)).await {
        let Some(part) = next? else { break };
        let Some(payload) = wire::part_payload(&part) else {
            continue;
        };
        let mut rest = payload.strip_prefix(wire::STREAM_MAGIC).unwrap_or(payload);
        while !rest.is_empty() {
            let (record, used) = wire::decode_record(rest)?;
            let [r, g, b] = record.color;
            let points: Vec<String> = record
                .points
                .iter()
                .map(|p| format!("({},{})", p.x, p.y))
                .collect();
            println!(
                "record rgb({r},{g},{b}) {} points: {}",
                record.points.len(),
                points.join(" ")
            );
            total += 1;
            rest = &rest[used..];
        }
    }
    println!("{total} records received");
    Ok(())
}

/// Consumes a response head up to its blank line.
async fn read_head(reader: &mut BufReader<OwnedReadHalf>) -> Result<(), Box<dyn Error>> {
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err("connection closed in response head".into());
        }
        if line == "\r\n" || line == "\n" {
            return Ok(());
        }
    }
}

/// Reads one transfer chunk, returning the part body between the hex
/// length line and the trailing CRLF.
async fn read_chunk(
    reader: &mut BufReader<OwnedReadHalf>,
) -> Result<Option<Vec<u8>>, Box<dyn Error>> {
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(None);
    }
    let len = usize::from_str_radix(line.trim(), 16)?;
    let mut part = vec![0u8; len];
    reader.read_exact(&mut part).await?;
    let mut crlf = [0u8; 2];
    reader.read_exact(&mut crlf).await?;
    Ok(Some(part))
}
