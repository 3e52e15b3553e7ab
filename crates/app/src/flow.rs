use anyhow::Context;
use solarcare_client::AppContext;
use solarcare_core::types::to_timestamp;

/// Sign in if needed, then walk the screens a customer would visit.
pub async fn run(ctx: &AppContext, phone: &str, otp: &str) -> anyhow::Result<()> {
    let session = ctx.store.with_state(|s| s.auth.last_login_time());
    match session.and_then(to_timestamp) {
        Some(at) => tracing::info!(last_login = %at, "Resuming saved session"),
        None => {
            ctx.auth.send_otp(phone).await.context("Failed to send OTP")?;
            let user = ctx
                .auth
                .verify_otp(phone, otp)
                .await
                .context("OTP verification failed")?;
            tracing::info!(user_id = %user.id, "Signed in");
        }
    }

    let categories = ctx.api.list_categories().await.context("Failed to load categories")?;
    for category in &categories {
        let services = ctx
            .api
            .list_services(Some(&category.id))
            .await
            .with_context(|| format!("Failed to load services for {}", category.name))?;
        tracing::info!(category = %category.name, services = services.len(), "Catalog");
    }

    let leads = ctx.api.list_leads().await.context("Failed to load leads")?;
    tracing::info!(leads = leads.len(), "Leads");
    for lead in &leads {
        let quotations = ctx.api.list_quotations(&lead.id).await?;
        tracing::info!(lead_id = %lead.id, status = ?lead.status, quotations = quotations.len(), "Lead");
    }

    let report = ctx.api.flush_offline_queue().await;
    if report.sent + report.dropped + report.kept > 0 {
        tracing::info!(sent = report.sent, dropped = report.dropped, kept = report.kept, "Offline queue flushed");
    }

    Ok(())
}
