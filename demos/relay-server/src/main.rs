use std::collections::HashSet;

use rallypoint::prelude::*;

// ---------------------------------------------------------------------------
// Authorization
// ---------------------------------------------------------------------------

/// Lets in identities listed in `RALLY_WHITELIST` (comma separated).
/// With the variable unset, any non-blank identity may join.
struct Whitelist {
    allowed: Option<HashSet<String>>,
}

impl Whitelist {
    fn from_env() -> Self {
        Self::parse(std::env::var("RALLY_WHITELIST").ok().as_deref())
    }

    fn parse(raw: Option<&str>) -> Self {
        let allowed = raw.map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect()
        });
        Self { allowed }
    }
}

impl Authorizer for Whitelist {
    async fn authorize(&self, member: &MemberId, _token: Option<&str>) -> Result<(), SessionError> {
        if member.is_blank() {
            return Err(SessionError::Unauthorized("blank member id".into()));
        }
        match &self.allowed {
            Some(allowed) if !allowed.contains(member.as_str()) => Err(
                SessionError::Unauthorized(format!("{member} is not whitelisted")),
            ),
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    rallypoint::init_tracing();

    let config = ServerConfig::from_env()?;
    let auth = Whitelist::from_env();
    if let Some(allowed) = &auth.allowed {
        tracing::info!(identities = allowed.len(), "whitelist enabled");
    }

    let server = RallyServerBuilder::from_config(config).build(auth).await?;
    tracing::info!(addr = %server.local_addr()?, "relay-server ready");

    server
        .run_with_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
