use anyhow::Result;
use std::net::SocketAddr;
use termssh::{cipher::CipherKind, Client, ClientConfig, Output, State};
use tokio::{
    io::{AsyncBufReadExt as _, AsyncWriteExt as _, BufReader},
    net::TcpStream,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let addr: SocketAddr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:22".into())
        .parse()?;

    let mut config = ClientConfig::default();
    config
        .session()
        .set_login(std::env::var("SSH_LOGIN").unwrap_or_default())
        .set_password(std::env::var("SSH_PASSWORD").unwrap_or_default())
        .set_ciphers(vec![CipherKind::Idea, CipherKind::Des3, CipherKind::Des]);
    if let Ok(fingerprint) = std::env::var("SSH_HOST_FINGERPRINT") {
        config.session().set_host_key_fingerprint(fingerprint);
    }

    tracing::debug!("connect to SSH server (addr = {})", addr);
    let stream = TcpStream::connect(&addr).await?;
    let mut client = Client::new(stream, config);

    tracing::debug!("run handshake");
    let mut stdout = tokio::io::stdout();
    let outputs = match client.handshake().await {
        Ok(outputs) => outputs,
        Err(err) => {
            if let Some(reason) = err.disconnect_reason() {
                eprintln!("server closed the connection: {}", reason);
            }
            return Err(err.into());
        }
    };
    for output in outputs {
        show(&mut stdout, output).await?;
    }
    if client.state() != State::Interactive {
        tracing::info!("session ended in {:?}", client.state());
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => client.send(&format!("{}\n", line)).await?,
                None => {
                    client.disconnect("Logged out.").await?;
                    break;
                }
            },
            outputs = client.recv() => match outputs {
                Ok(outputs) => {
                    for output in outputs {
                        show(&mut stdout, output).await?;
                    }
                }
                Err(err) => {
                    for output in client.take_undelivered() {
                        show(&mut stdout, output).await?;
                    }
                    tracing::debug!("session closed: {}", err);
                    break;
                }
            },
        }
    }

    if let Some(status) = client.session().exit_status() {
        tracing::info!("remote shell exited with status {}", status);
    }

    Ok(())
}

async fn show(stdout: &mut tokio::io::Stdout, output: Output) -> Result<()> {
    match output {
        Output::Stdout(data) | Output::Stderr(data) => stdout.write_all(&data).await?,
        Output::Notice(msg) => stdout.write_all(format!("{}\r\n", msg).as_bytes()).await?,
    }
    stdout.flush().await?;
    Ok(())
}
