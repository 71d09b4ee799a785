//! The `exec` service: run a configured command and stream its output.
//!
//! The requester supplies `{ command, arguments }`; on CONNECT the server
//! spawns the command and relays its stdout and stderr to the client until
//! the process exits. The client half relays everything to its own stdout.

use std::io::{self, Read};
use std::process::{Command, Stdio};

use capone_crypto::SignPublicKey;
use capone_wire::messages::ExecParams;
use capone_wire::{Deserializable, Serializable};

use crate::channel::Channel;
use crate::config::Config;
use crate::service::{ServiceError, ServicePlugin};
use crate::session::Session;

/// The built-in shell service.
pub struct ExecService;

impl ServicePlugin for ExecService {
    fn category(&self) -> &'static str { "Shell" }

    fn kind(&self) -> &'static str { "exec" }

    fn version(&self) -> &'static str { "0.1.0" }

    /// First argument is the command, the rest are passed to it verbatim.
    fn parse_params(&self, args: &[String]) -> Result<Vec<u8>, ServiceError> {
        let Some((command, arguments)) = args.split_first() else {
            return Err(ServiceError::InvalidArguments("missing command".into()));
        };
        let params = ExecParams {
            command:   command.clone(),
            arguments: arguments.to_vec(),
        };
        Ok(params.to_bytes())
    }

    fn decode_params(&self, raw: &[u8]) -> Result<(), ServiceError> {
        ExecParams::from_bytes(raw).map_err(|_| ServiceError::InvalidParameters)?;
        Ok(())
    }

    fn serve(
        &self,
        channel: Channel,
        _invoker: &SignPublicKey,
        session: &Session,
        _config: &Config,
    ) -> Result<(), ServiceError> {
        let params = ExecParams::from_bytes(&session.parameters)
            .map_err(|_| ServiceError::InvalidParameters)?;

        log::debug!("exec service running '{}'", params.command);

        let mut child = Command::new(&params.command)
            .args(&params.arguments)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ServiceError::Io(io::Error::other("child stdout not captured")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ServiceError::Io(io::Error::other("child stderr not captured")))?;
        let sources: Vec<Box<dyn Read + Send>> = vec![Box::new(stdout), Box::new(stderr)];

        let relayed = channel.relay(io::sink(), sources);
        let _ = child.wait();
        relayed?;

        Ok(())
    }

    fn invoke(
        &self,
        channel: Channel,
        _args: &[String],
        _config: &Config,
    ) -> Result<(), ServiceError> {
        channel.relay(io::stdout(), Vec::new())?;
        Ok(())
    }
}
