use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use dotenvy::dotenv;
use serde::Deserialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use webauthn_verifier::{
    Aaguid, AaguidTrustAnchorRepository, AsyncRegistrationValidator,
    KeyStoreTrustAnchorAsyncRepository, PemFileKeyStoreLoader, RegistrationData,
    RegistrationRequest, TrustAnchorAsyncRepository, TrustAnchorLoadError, TrustAnchorRepository,
    TrustAnchorSet, ValidatorConfig,
};

/// Serves a pre-built repository through the async lookup interface.
struct Preloaded(AaguidTrustAnchorRepository);

#[async_trait]
impl TrustAnchorAsyncRepository for Preloaded {
    async fn find_by_aaguid(&self, aaguid: &Aaguid) -> Result<TrustAnchorSet, TrustAnchorLoadError> {
        Ok(self.0.find_by_aaguid(aaguid))
    }

    async fn find_by_key_identifier(
        &self,
        key_identifier: &[u8],
    ) -> Result<TrustAnchorSet, TrustAnchorLoadError> {
        Ok(self.0.find_by_key_identifier(key_identifier))
    }
}

/// A captured `navigator.credentials.create()` response with its challenge.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistrationFixture {
    attestation_object: String,
    #[serde(rename = "clientDataJSON")]
    client_data_json: String,
    challenge: String,
}

impl RegistrationFixture {
    fn into_request(self) -> Result<RegistrationRequest, Box<dyn std::error::Error>> {
        Ok(RegistrationRequest::new(
            URL_SAFE_NO_PAD.decode(self.attestation_object.trim_end_matches('='))?,
            URL_SAFE_NO_PAD.decode(self.client_data_json.trim_end_matches('='))?,
            URL_SAFE_NO_PAD.decode(self.challenge.trim_end_matches('='))?,
        ))
    }
}

async fn verify() -> Result<RegistrationData, Box<dyn std::error::Error>> {
    let config = ValidatorConfig::from_env()?;
    tracing::info!("Relying party: {}", config.rp_id);

    let fixture_path = env::var("REGISTRATION_FIXTURE")
        .map_err(|_| "REGISTRATION_FIXTURE must point to a registration response JSON file")?;
    let fixture: RegistrationFixture =
        serde_json::from_slice(&tokio::fs::read(&fixture_path).await?)?;
    let request = fixture.into_request()?;

    let anchors: Arc<dyn TrustAnchorAsyncRepository> = match env::var("TRUST_ANCHOR_PEM") {
        Ok(pem_path) => {
            tracing::info!("Using trust anchors from {pem_path}");
            Arc::new(KeyStoreTrustAnchorAsyncRepository::new(
                PemFileKeyStoreLoader::new(pem_path),
            ))
        }
        Err(_) => {
            tracing::warn!("TRUST_ANCHOR_PEM not set, no attestation can be trusted");
            Arc::new(Preloaded(AaguidTrustAnchorRepository::new()))
        }
    };

    Ok(AsyncRegistrationValidator::new(config, anchors)
        .validate(&request)
        .await?)
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("{}=debug,webauthn_verifier=debug", env!("CARGO_CRATE_NAME")).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match verify().await {
        Ok(data) => {
            println!("format:        {}", data.attestation_format);
            println!("type:          {}", data.attestation_type);
            println!("verdict:       {}", data.verdict);
            println!("aaguid:        {}", data.aaguid);
            println!("sign count:    {}", data.sign_count);
            println!("user verified: {}", data.user_verified);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Registration rejected: {e}");
            ExitCode::FAILURE
        }
    }
}
