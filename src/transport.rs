use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{SmtpTransport, Transport as _};
use log::{debug, info};

use crate::config::{Encryption, SmtpSettings};
use crate::error::DispatchError;
use crate::reply::OutboundReply;

/// Delivers generated replies.
pub trait Transport {
    fn send(&self, reply: &OutboundReply) -> Result<(), DispatchError>;
}

/// SMTP delivery configured from the settings file. One session per reply.
pub struct SmtpRelay {
    settings: SmtpSettings,
}

impl SmtpRelay {
    pub fn new(settings: SmtpSettings) -> Self {
        Self { settings }
    }

    fn tls(&self) -> Result<Tls, DispatchError> {
        let params = || {
            TlsParameters::new(self.settings.host.clone()).map_err(|source| DispatchError::Tls {
                host: self.settings.host.clone(),
                source,
            })
        };
        Ok(match self.settings.encryption {
            Encryption::None => Tls::None,
            Encryption::StartTls => Tls::Required(params()?),
            Encryption::ImplicitTls => Tls::Wrapper(params()?),
        })
    }

    fn mailer(&self) -> Result<SmtpTransport, DispatchError> {
        let mut builder = SmtpTransport::builder_dangerous(&self.settings.host)
            .port(self.settings.port)
            .tls(self.tls()?);
        if let Some(creds) = &self.settings.credentials {
            debug!("[transport] authenticating as {}", creds.username);
            builder = builder.credentials(Credentials::new(
                creds.username.clone(),
                creds.password.clone(),
            ));
        }
        Ok(builder.build())
    }
}

impl Transport for SmtpRelay {
    fn send(&self, reply: &OutboundReply) -> Result<(), DispatchError> {
        let message = reply.to_message()?;
        debug!(
            "[transport] connecting to {}:{} ({:?})",
            self.settings.host, self.settings.port, self.settings.encryption
        );
        let response = self.mailer()?.send(&message)?;
        info!(
            "[transport] reply {} sent to {}: {}",
            reply.message_id,
            reply.to,
            response.code()
        );
        Ok(())
    }
}
