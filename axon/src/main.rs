#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;

use anyhow::Context as _;
use args::{Args, Command};
use axon_config::Config;
use axon_llm::types::{ChatCompletionRequest, ImageRequest, Message, SpeechRequest};
use axon_llm::{Provider, RequestContext, StreamEvent, build_client};
use clap::Parser;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // rustls has more than one crypto backend linked in; pick one before any TLS handshake
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let config = Config::load(&args.config)?;
    axon_telemetry::init(config.telemetry.as_ref(), "warn")?;

    let (name, client_config) = match &args.client {
        Some(name) => config
            .clients
            .get_key_value(name.as_str())
            .with_context(|| format!("no client named `{name}` in {}", args.config.display()))?,
        None => config.clients.first().context("no clients configured")?,
    };

    tracing::info!(
        client = %name,
        provider = %client_config.provider,
        model = %client_config.model,
        "using client"
    );

    let client = build_client(client_config, None)?;

    let shutdown = CancellationToken::new();
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_clone.cancel();
    });

    let context = RequestContext::with_cancellation(shutdown.child_token());

    match args.command {
        Command::Chat { prompt, system, stream } => {
            let mut messages = Vec::new();
            if let Some(system) = system {
                messages.push(Message::system(system));
            }
            messages.push(Message::user(prompt));

            let request = ChatCompletionRequest::new(String::new(), messages);
            if stream {
                chat_stream(client.as_ref(), &request, &context).await
            } else {
                chat(client.as_ref(), &request, &context).await
            }
        }
        Command::Image { prompt, size, n, b64 } => {
            let request = ImageRequest {
                prompt,
                size,
                n: Some(n),
                response_format: Some(if b64 { "b64_json" } else { "url" }.to_owned()),
                ..ImageRequest::default()
            };

            let response = client.image(&request, &context).await?;
            let mut stdout = tokio::io::stdout();
            for image in response.data {
                let line = match (image.url, image.b64_json) {
                    (Some(url), _) => url,
                    (None, Some(data)) => data,
                    (None, None) => continue,
                };
                stdout.write_all(line.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
            }
            Ok(())
        }
        Command::Speech { input, voice, output } => {
            let request = SpeechRequest {
                input,
                voice,
                ..SpeechRequest::default()
            };

            let response = client.speech(&request, &context).await?;
            tokio::fs::write(&output, &response.audio)
                .await
                .with_context(|| format!("failed to write {}", output.display()))?;

            tracing::info!(
                path = %output.display(),
                bytes = response.audio.len(),
                content_type = %response.content_type,
                "speech written"
            );
            Ok(())
        }
    }
}

async fn chat(client: &dyn Provider, request: &ChatCompletionRequest, context: &RequestContext) -> anyhow::Result<()> {
    let response = client.chat_completion(request, context).await?;

    let mut stdout = tokio::io::stdout();
    stdout.write_all(response.text().unwrap_or_default().as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    Ok(())
}

async fn chat_stream(
    client: &dyn Provider,
    request: &ChatCompletionRequest,
    context: &RequestContext,
) -> anyhow::Result<()> {
    let mut stream = client.chat_completion_stream(request, context).await?;
    let mut stdout = tokio::io::stdout();

    while let Some(event) = stream.recv().await {
        match event {
            StreamEvent::Chunk(chunk) => {
                if let Some(text) = chunk.text() {
                    stdout.write_all(text.as_bytes()).await?;
                    stdout.flush().await?;
                }
            }
            StreamEvent::Done { timing } => {
                stdout.write_all(b"\n").await?;
                tracing::info!(
                    conn_time_ms = timing.conn_time,
                    total_time_ms = timing.total_time,
                    "stream finished"
                );
            }
            StreamEvent::Error { error, .. } => return Err(error.into()),
        }
    }

    Ok(())
}

/// Wait for a shutdown signal (`SIGINT` or `SIGTERM`)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("shutdown signal received");
}
