//! Wi-Fi example: provision Wi-Fi credentials over the serial console
//!
//! Values can come from a JSON credentials file, from the command line, or
//! be typed in when the device asks for them.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example wifi_setup -- --port /dev/ttyACM0 --ssid home --security WPA2_AES
//! ```
//!
//! From a file:
//! ```bash
//! cargo run --example wifi_setup -- --port /dev/ttyACM0 --file wifi.json
//! ```

use std::env;
use std::path::PathBuf;

use ferriflash::driver::{AnswerSource, Question, WifiCredentials, WifiSetup};
use ferriflash::transport::{SerialConfig, SerialTransport};
use futures_util::future::BoxFuture;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};

/// Asks on the terminal for anything the credentials lack.
struct Terminal {
    lines: Lines<BufReader<Stdin>>,
}

impl AnswerSource for Terminal {
    fn answer(&mut self, question: Question) -> BoxFuture<'_, ferriflash::Result<String>> {
        Box::pin(async move {
            let multiline = matches!(
                question,
                Question::ClientCertificate | Question::PrivateKey | Question::RootCa
            );

            let mut stdout = tokio::io::stdout();
            if multiline {
                stdout
                    .write_all(format!("{} (end with an empty line):\n", question).as_bytes())
                    .await?;
            } else {
                stdout.write_all(format!("{}: ", question).as_bytes()).await?;
            }
            stdout.flush().await?;

            let mut answer = String::new();
            while let Some(line) = self.lines.next_line().await? {
                if !multiline {
                    return Ok(line);
                }
                if line.is_empty() {
                    break;
                }
                answer.push_str(&line);
                answer.push('\n');
            }
            Ok(answer)
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging (set RUST_LOG=debug for verbose output)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut credentials = match &args.file {
        Some(path) => WifiCredentials::from_json_file(path)?,
        None => WifiCredentials::new(),
    };
    if let Some(ssid) = args.ssid {
        credentials = credentials.network(ssid);
    }
    if let Some(security) = args.security {
        credentials = credentials.security(security);
    }

    println!("Attempting to configure Wi-Fi on {}", args.port);
    let port = SerialTransport::open(&SerialConfig::new(&args.port))?;

    let terminal = Terminal {
        lines: BufReader::new(tokio::io::stdin()).lines(),
    };
    WifiSetup::new(credentials).answers(terminal).run(port).await?;

    println!("Done! Your device should now restart.");
    Ok(())
}

/// Simple argument parser (avoiding external dependencies)
struct Args {
    port: String,
    file: Option<PathBuf>,
    ssid: Option<String>,
    security: Option<String>,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut port = "/dev/ttyACM0".to_string();
        let mut file = None;
        let mut ssid = None;
        let mut security = None;

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--port" | "-p" => {
                    i += 1;
                    if i < args.len() {
                        port = args[i].clone();
                    }
                }
                "--file" | "-f" => {
                    i += 1;
                    if i < args.len() {
                        file = Some(PathBuf::from(&args[i]));
                    }
                }
                "--ssid" | "-s" => {
                    i += 1;
                    if i < args.len() {
                        ssid = Some(args[i].clone());
                    }
                }
                "--security" => {
                    i += 1;
                    if i < args.len() {
                        security = Some(args[i].clone());
                    }
                }
                "--help" => {
                    Self::print_help();
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                }
            }
            i += 1;
        }

        Self {
            port,
            file,
            ssid,
            security,
        }
    }

    fn print_help() {
        println!(
            r#"ferriflash wifi_setup example

USAGE:
    cargo run --example wifi_setup -- [OPTIONS]

OPTIONS:
    -p, --port <PATH>        Serial device [default: /dev/ttyACM0]
    -f, --file <PATH>        JSON credentials file
    -s, --ssid <SSID>        Network name
    --security <TYPE>        Security, e.g. WPA2_AES, WPA2_802.1x, NONE
    --help                   Print this help message
"#
        );
    }
}
