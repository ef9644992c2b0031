/* This file is part of nzcore.
 *
 * Copyright (C) 2024-2026 NewZone Project Contributors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use std::sync::Arc;

use log::{info, warn, LevelFilter};
use simplelog::{ColorChoice, Config as LogConfig, TermLogger, TerminalMode};
use smol::net::{TcpListener, TcpStream};
use structopt_toml::StructOptToml;

use nzcore::{
    bootstrap,
    net::pool::PoolConfig,
    util::expand_path,
    AppContext,
};

mod settings;
use settings::{Args, Subcmd, CONFIG_FILE, CONFIG_FILE_CONTENTS};

/// The bootstrap CLI contract: prompt for a password (≥ 8 chars,
/// confirmed), accept or generate a mnemonic, initialize `env/`, and
/// exit non-zero on any validation failure.
fn run_init(env_dir: &std::path::Path, mnemonic: Option<String>) -> nzcore::Result<()> {
    use std::io::Write;

    print!("Password (min {} chars): ", bootstrap::MIN_PASSWORD_LEN);
    std::io::stdout().flush().ok();
    let mut password = String::new();
    std::io::stdin().read_line(&mut password)?;
    let password = password.trim_end_matches(['\n', '\r']);

    print!("Confirm password: ");
    std::io::stdout().flush().ok();
    let mut confirm = String::new();
    std::io::stdin().read_line(&mut confirm)?;
    let confirm = confirm.trim_end_matches(['\n', '\r']);

    if password != confirm {
        return Err(nzcore::Error::InvalidPassword)
    }

    let env = bootstrap::init_env(env_dir, password, mnemonic)?;
    println!("initialized {}", env.paths.root.display());
    println!("node identity (base64): {}", {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(env.identity.ed25519_public)
    });
    Ok(())
}

fn log_level(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Accept loop: every inbound TCP stream becomes a pooled `Connection`.
/// Per §5's suspension-point model, each accepted socket gets its own
/// read task; the pool itself is the only shared, owner-local state.
async fn accept_loop(ctx: Arc<AppContext<futures::io::WriteHalf<TcpStream>>>, listener: TcpListener) {
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!("accept failed: {e}");
                continue
            }
        };
        info!("accepted connection from {peer_addr}");

        let ctx = ctx.clone();
        smol::spawn(async move {
            use futures::AsyncReadExt;
            let (mut reader, writer) = stream.split();
            let conn_id = rand::random::<u64>();
            let conn = nzcore::net::connection::Connection::new(
                conn_id,
                writer,
                nzcore::net::frame::DEFAULT_MAX_FRAME_SIZE,
            );
            conn.mark_connected().await;
            if ctx.pool.add(peer_addr.to_string(), conn.clone()).await.is_err() {
                warn!("connection pool full, dropping {peer_addr}");
                return
            }

            let mut buf = vec![0u8; 64 * 1024];
            loop {
                match reader.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        let _ = conn.feed_inbound(&buf[..n]).await;
                    }
                }
            }
        })
        .detach();
    }
}

fn main_inner(args: Args) -> nzcore::Result<()> {
    let env_dir = expand_path(&args.env_dir)?;

    let env = if bootstrap::is_initialized(&env_dir) {
        bootstrap::start_daemon_env(&env_dir)?
    } else {
        warn!("{} is not initialized; run the setup CLI first", env_dir.display());
        return Err(nzcore::Error::MasterKeyMissing)
    };

    let ctx = Arc::new(AppContext::new(env, PoolConfig::default()));
    info!("node id: {}", ctx.node_id.to_hex());

    smol::block_on(async {
        let bind_addr = format!("{}:{}", args.bind_address, args.bind_port);
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("listening on {bind_addr}");

        let accept_task = smol::spawn(accept_loop(ctx.clone(), listener));

        let (signal, shutdown) = smol::channel::bounded::<()>(1);
        ctrlc::set_handler(move || {
            let _ = signal.try_send(());
        })
        .expect("failed to install SIGINT handler");

        let _ = shutdown.recv().await;
        info!("caught termination signal, shutting down");
        accept_task.cancel().await;
        Ok::<(), nzcore::Error>(())
    })?;

    Ok(())
}

fn main() -> nzcore::Result<()> {
    let args = Args::from_args_with_toml(CONFIG_FILE_CONTENTS).map_err(|e| {
        nzcore::Error::InvalidInput(format!("failed to parse {CONFIG_FILE}: {e}"))
    })?;

    TermLogger::init(log_level(args.verbose), LogConfig::default(), TerminalMode::Mixed, ColorChoice::Auto)
        .expect("failed to initialize logger");

    if let Some(Subcmd::Init { mnemonic }) = args.command.clone() {
        let env_dir = expand_path(&args.env_dir)?;
        return run_init(&env_dir, mnemonic)
    }

    main_inner(args)
}
