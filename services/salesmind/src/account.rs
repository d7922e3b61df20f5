//! Logging in and picking the training session a command runs in.

use crate::cli::{AccountArgs, ScenarioArgs};
use anyhow::{Context, Result, bail};
use salesmind_core::{
    ApiClient, AppSession, SessionProfile,
    api::{SessionMode, StartSessionRequest},
};
use tracing::info;

/// Authenticates from a token or credentials.
pub async fn login(api: &ApiClient, account: &AccountArgs) -> Result<AppSession> {
    let mut app = AppSession::new();
    match (&account.token, &account.username, &account.password) {
        (Some(token), username, _) => app.login(token.clone(), username.clone()),
        (None, Some(username), Some(password)) => {
            api.login(&mut app, username, password)
                .await
                .context("Login failed")?;
        }
        _ => bail!("Provide --token, or --username and --password"),
    }
    Ok(app)
}

/// Joins `--session-id` if given, otherwise starts a session from the scenario.
pub async fn ensure_session(
    api: &ApiClient,
    app: &mut AppSession,
    account: &AccountArgs,
    scenario: &ScenarioArgs,
) -> Result<()> {
    if let Some(id) = account.session_id {
        app.begin_session(id, profile(scenario));
        return Ok(());
    }

    let (Some(industry), Some(value_proposition)) =
        (&scenario.industry, &scenario.value_proposition)
    else {
        bail!("Provide --session-id, or --industry and --value-proposition to start a session");
    };
    let request = StartSessionRequest {
        mode: SessionMode::Simple,
        industry: industry.clone(),
        value_proposition: value_proposition.clone(),
        customer_persona: scenario.persona.clone(),
    };
    let info = api
        .start_session(app, &request)
        .await
        .context("Failed to start a training session")?;
    info!(session_id = %info.id, "Started training session");
    Ok(())
}

fn profile(scenario: &ScenarioArgs) -> SessionProfile {
    SessionProfile {
        industry: scenario.industry.clone(),
        value_proposition: scenario.value_proposition.clone(),
        customer_persona: scenario.persona.clone(),
    }
}
