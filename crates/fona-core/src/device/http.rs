//! HTTP client commands
//!
//! Requests complete asynchronously: the modem reports `+HTTPACTION` once the
//! server has answered, the body is fetched in the background and the result
//! arrives through [`FonaDevice::on_http_response`].

use super::FonaDevice;
use crate::protocol::ProtocolError;
use crate::types::HttpMethod;

const TERMINATE: &str = "AT+HTTPTERM";
const PARAMETER: &str = "AT+HTTPPARA=";

impl FonaDevice {
    /// Start an HTTP request over the open GPRS bearer. Returns once the modem
    /// has accepted it.
    pub fn send_http_request(
        &self,
        method: HttpMethod,
        url: &str,
        allow_redirect: bool,
    ) -> Result<(), ProtocolError> {
        if url.is_empty() {
            return Err(ProtocolError::InvalidArgument("empty URL".to_string()));
        }
        self.http_initialize(url, allow_redirect)?;
        self.command(&format!("AT+HTTPACTION={}", method.action_code()))?;
        tracing::debug!("HTTP {:?} {} started", method, url);
        Ok(())
    }

    /// Tear down the HTTP service
    pub fn http_terminate(&self) -> Result<(), ProtocolError> {
        self.command(TERMINATE)
    }

    fn http_initialize(&self, url: &str, allow_redirect: bool) -> Result<(), ProtocolError> {
        // Fails whenever no HTTP session was open, so only transport errors count
        {
            let mut exchange = self.engine().send(TERMINATE)?;
            match exchange.read_reply() {
                Ok(reply) => tracing::trace!("{} -> {}", TERMINATE, reply),
                Err(e) => tracing::debug!("{} ignored: {}", TERMINATE, e),
            }
        }

        self.command("AT+HTTPINIT")?;
        self.command(&format!("{}\"CID\",1", PARAMETER))?;
        if let Some(agent) = self.inner.config.http_user_agent.as_deref().filter(|a| !a.is_empty()) {
            self.command(&format!("{}\"UA\",\"{}\"", PARAMETER, agent))?;
        }
        self.command(&format!("{}\"URL\",\"{}\"", PARAMETER, url))?;
        self.command(&format!("{}\"REDIR\",{}", PARAMETER, u8::from(allow_redirect)))
    }
}
