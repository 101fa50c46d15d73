use crate::error::Result;
use crate::gateway::DeviceSession;
use crate::store::{EnrolmentIdentity, StateStore};
use anyhow::anyhow;

/// Fetch fresh MQTT credentials and store the password with the enrolment
/// identity. Returns the username.
pub async fn refresh_mqtt_credentials(store: &dyn StateStore, session: &DeviceSession) -> Result<String> {
    let credentials = session.post_mqtt_credentials().await?;
    let (Some(username), Some(password)) = (credentials.username, credentials.password) else {
        return Err(anyhow!("backend returned no MQTT credentials").into());
    };
    EnrolmentIdentity::set_mqtt_password(store, &password)?;
    tracing::info!(username = username.as_str(), "MQTT credentials refreshed");
    Ok(username)
}
