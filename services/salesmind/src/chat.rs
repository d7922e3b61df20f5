//! `salesmind chat`: one streamed text exchange.

use crate::{account, cli::ChatArgs};
use anyhow::{Context, Result};
use futures::StreamExt;
use salesmind_core::{ApiClient, ApiError, ChatEvent, ChatReply};
use std::io::Write;

pub async fn run(args: ChatArgs) -> Result<()> {
    let api = ApiClient::new(&args.account.api_base)?;
    let mut app = account::login(&api, &args.account).await?;
    account::ensure_session(&api, &mut app, &args.account, &args.scenario).await?;

    let mut stream = api
        .chat_stream(&mut app, &args.message)
        .await
        .context("Chat request failed")?;

    let mut reply = ChatReply::default();
    let mut stdout = std::io::stdout();
    while let Some(event) = stream.next().await {
        let event = event?;
        if let ChatEvent::Chunk { content } = &event {
            write!(stdout, "{content}")?;
            stdout.flush()?;
        }
        if let Err(e) = reply.apply(event) {
            writeln!(stdout)?;
            if let ApiError::Stream {
                upgrade_required: true,
                landing_page_url,
                ..
            } = &e
            {
                eprintln!(
                    "Upgrade required: {}",
                    landing_page_url.as_deref().unwrap_or("see your account page")
                );
            }
            return Err(e.into());
        }
        if reply.finished {
            break;
        }
    }
    writeln!(stdout)?;

    if !reply.details.is_empty() {
        println!("{}", serde_json::to_string_pretty(&reply.details)?);
    }

    if args.finish {
        let report = api
            .finish_session(&mut app)
            .await
            .context("Failed to finish the session")?;
        println!("{}", serde_json::to_string_pretty(&report.details)?);
        if let Some(report_id) = report.report_id {
            println!("Report: {report_id}");
        }
    }
    Ok(())
}
