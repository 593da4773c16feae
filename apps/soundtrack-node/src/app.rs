//! Runs one discovery role until it finishes or is interrupted.

use soundtrack_discovery::{
    DiscoveryError, Receiver, ReceiverConfig, Responder, ResponderConfig, generate_id,
};
use tokio_util::sync::CancellationToken;

/// Polls once and prints the servers that answered.
pub async fn poll(config: ReceiverConfig, json: bool) -> anyhow::Result<()> {
    let mut receiver = Receiver::bind(config)?;
    let cancel = shutdown_on_ctrl_c();

    let mut events = receiver
        .take_events()
        .ok_or_else(|| anyhow::anyhow!("status events already taken"))?;
    let status = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            tracing::info!("{event}");
        }
    });

    let attempts = receiver.config().poll_attempts;
    let timeout = receiver.config().poll_timeout();
    let result = receiver.poll_servers_until(attempts, timeout, &cancel).await;

    // Closes the event channel so the status task finishes.
    drop(receiver);
    let _ = status.await;

    let servers = match result {
        Ok(servers) => servers,
        Err(DiscoveryError::Cancelled) => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&servers)?);
    } else {
        for server in &servers {
            println!("{server}");
        }
    }
    Ok(())
}

/// Answers probes until Ctrl-C.
pub async fn serve(mut config: ResponderConfig) -> anyhow::Result<()> {
    if config.id.is_empty() {
        config.id = generate_id();
        tracing::info!(id = %config.id, "generated server id");
    }

    let mut responder = Responder::bind(config)?;
    if let Some(mut direct) = responder.take_direct_messages() {
        tokio::spawn(async move {
            while let Some(datagram) = direct.recv().await {
                tracing::debug!(from = %datagram.from, len = datagram.data.len(), "direct message");
            }
        });
    }

    tracing::info!(
        name = %responder.config().name,
        id = %responder.config().id,
        multicast_port = responder.multicast_port()?,
        comm_tx = %responder.comm_tx_addr()?,
        comm_rx = %responder.comm_rx_addr()?,
        "serving discovery"
    );

    responder.run_context(shutdown_on_ctrl_c()).await?;
    Ok(())
}

fn shutdown_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("SIGINT received, shutting down"),
            Err(e) => {
                tracing::error!("failed to listen for Ctrl-C: {e}");
                return;
            }
        }
        trigger.cancel();
    });
    cancel
}
