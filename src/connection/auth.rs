//! Login handshake coordination.
//!
//! The handshake is a consumer of the same dispatch hub it lives next to:
//! each step sends a request through the normal outbound path and waits for
//! the matching reply on a packet collector, bounded by the configured
//! per-step timeout. A failed or timed-out step fails the whole login and
//! leaves the connection state at `Connected`, so the caller may retry
//! without reconnecting the transport.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{AuthError, Error};
use crate::packet::{IdFilter, Iq, IqPayload, IqType, Packet};

use super::connection::Connection;

pub(crate) struct Handshake<'a> {
    connection: &'a Arc<Connection>,
    step_timeout: Duration,
}

impl<'a> Handshake<'a> {
    pub fn new(connection: &'a Arc<Connection>) -> Self {
        let step_timeout = connection.config().reply_timeout;
        Self {
            connection,
            step_timeout,
        }
    }

    /// Credential login: mechanism discovery, then credential submission
    /// with resource binding. Returns the jid assigned by the server.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        resource: &str,
    ) -> Result<String, Error> {
        let discover = Iq::get(IqPayload::Auth {
            username: Some(username.to_string()),
            password: None,
            resource: None,
        });
        let reply = self.round_trip(discover, "auth-discovery").await?;
        if reply.iq_type == IqType::Error {
            return Err(Self::rejection(&reply, "auth-discovery").into());
        }
        debug!(username, "auth mechanisms discovered");

        let submit = Iq::set(IqPayload::Auth {
            username: Some(username.to_string()),
            password: Some(password.to_string()),
            resource: Some(resource.to_string()),
        });
        let reply = self.round_trip(submit, "auth-submit").await?;
        Self::bound_jid(&reply, "auth-submit")
    }

    /// Anonymous login: a single all-empty credential submission. The
    /// server assigns the address.
    pub async fn login_anonymously(&self) -> Result<String, Error> {
        let submit = Iq::set(IqPayload::Auth {
            username: None,
            password: None,
            resource: None,
        });
        let reply = self.round_trip(submit, "auth-anonymous").await?;
        Self::bound_jid(&reply, "auth-anonymous")
    }

    /// Roster load performed at login when configured. Failure is logged
    /// and does not fail the login.
    pub async fn load_roster(&self) {
        let request = Iq::get(IqPayload::Roster { items: Vec::new() });
        match self.round_trip(request, "roster").await {
            Ok(reply) => match reply.payload {
                IqPayload::Roster { items } => {
                    debug!(entries = items.len(), "roster loaded");
                }
                _ => warn!("roster reply carried no roster"),
            },
            Err(error) => warn!(error = %error, "roster load failed"),
        }
    }

    /// Send one request and wait for the reply with the matching id.
    async fn round_trip(&self, request: Iq, step: &'static str) -> Result<Iq, Error> {
        let collector = self
            .connection
            .create_packet_collector(Some(Arc::new(IdFilter::new(request.id.clone()))))?;

        let result = async {
            self.connection.send_packet(Packet::Iq(request)).await?;

            match collector.next_result_timeout(self.step_timeout).await {
                Some(Packet::Iq(reply)) => Ok(reply),
                Some(_) => Err(AuthError::MalformedReply { step }.into()),
                None => Err(AuthError::StepTimeout { step }.into()),
            }
        }
        .await;

        collector.cancel();
        result
    }

    fn bound_jid(reply: &Iq, step: &'static str) -> Result<String, Error> {
        match &reply.payload {
            IqPayload::Bound { jid } if reply.iq_type == IqType::Result => Ok(jid.clone()),
            IqPayload::Error { .. } => Err(Self::rejection(reply, step).into()),
            _ => Err(AuthError::MalformedReply { step }.into()),
        }
    }

    fn rejection(reply: &Iq, step: &'static str) -> AuthError {
        match &reply.payload {
            IqPayload::Error { condition, .. } => AuthError::Rejected {
                condition: condition.clone(),
            },
            _ => AuthError::MalformedReply { step },
        }
    }
}
