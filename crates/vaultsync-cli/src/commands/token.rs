//! `vaultsync token` - mint a device token

use clap::Args;

use vaultsync_core::token::make_device_token;
use vaultsync_core::DeviceId;

use crate::output::{emit, OutputFormat};

#[derive(Debug, Args)]
pub struct TokenCommand {
    /// The server's shared secret
    #[arg(long, env = "VAULTSYNC_SECRET")]
    secret: String,

    /// Device id to mint for; generated when omitted
    #[arg(long)]
    device_id: Option<String>,
}

impl TokenCommand {
    pub async fn execute(self, format: OutputFormat) -> anyhow::Result<()> {
        let device_id = match self.device_id {
            Some(raw) => DeviceId::new(raw)?,
            None => DeviceId::generate(),
        };
        let token = make_device_token(self.secret.as_bytes(), &device_id);

        emit(
            format,
            serde_json::json!({
                "deviceId": device_id.as_str(),
                "token": token,
            }),
            || {
                println!("Device id: {device_id}");
                println!("Token:     {token}");
            },
        );
        Ok(())
    }
}
