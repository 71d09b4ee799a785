//! End-to-end exercises of the protocol engine against an in-process server.

use std::sync::Arc;
use std::thread;

use capone_crypto::{SignKeyPair, SignPublicKey};
use capone_proto::caps::{CapabilityError, Rights};
use capone_proto::channel::Channel;
use capone_proto::config::{Config, CoreConfig};
use capone_proto::server::{self, ServerContext};
use capone_proto::service::{ServiceError, ServicePlugin};
use capone_proto::session::Session;
use capone_proto::{Acl, Capability, Listener, Service, SessionStore, client};
use capone_wire::messages::Command;

// ─── Echo test service ────────────────────────────────────────────────────────

/// Writes the session parameters straight back to the connecting client.
struct EchoService;

impl ServicePlugin for EchoService {
    fn category(&self) -> &'static str { "Test" }
    fn kind(&self) -> &'static str { "echo" }
    fn version(&self) -> &'static str { "0.0.1" }

    fn parse_params(&self, args: &[String]) -> Result<Vec<u8>, ServiceError> {
        Ok(args.join(" ").into_bytes())
    }

    fn decode_params(&self, _raw: &[u8]) -> Result<(), ServiceError> {
        Ok(())
    }

    fn serve(
        &self,
        mut channel: Channel,
        _invoker: &SignPublicKey,
        session: &Session,
        _config: &Config,
    ) -> Result<(), ServiceError> {
        channel.write_message(&session.parameters)?;
        Ok(())
    }

    fn invoke(
        &self,
        _channel: Channel,
        _args: &[String],
        _config: &Config,
    ) -> Result<(), ServiceError> {
        Ok(())
    }
}

// ─── Fixture ──────────────────────────────────────────────────────────────────

struct ServerState {
    keys:        SignKeyPair,
    service:     Service,
    config:      Config,
    sessions:    SessionStore,
    query_acl:   Acl,
    request_acl: Acl,
}

struct Fixture {
    port:   u16,
    public: SignPublicKey,
    state:  Arc<ServerState>,
}

impl Fixture {
    /// Start a server with the given ACLs on an ephemeral port.
    fn start(query_acl: Acl, request_acl: Acl) -> Self {
        let keys = SignKeyPair::generate().unwrap();
        let public = *keys.public();

        let state = Arc::new(ServerState {
            service: Service {
                name:     "echo test".into(),
                port:     0,
                location: "test".into(),
                plugin:   Box::new(EchoService),
            },
            config: Config {
                core: CoreConfig {
                    name:       "test server".into(),
                    public_key: public.to_hex(),
                    secret_key: String::new(),
                },
                services: Vec::new(),
            },
            sessions: SessionStore::new(),
            query_acl,
            request_acl,
            keys,
        });

        let listener = Listener::bind("127.0.0.1", 0).unwrap();
        let port = listener.local_addr().unwrap().port();

        let loop_state = Arc::clone(&state);
        thread::spawn(move || {
            loop {
                let Ok(channel) = listener.accept() else { break };
                let state = Arc::clone(&loop_state);
                thread::spawn(move || {
                    let ctx = ServerContext {
                        sign_keys:   &state.keys,
                        service:     &state.service,
                        config:      &state.config,
                        sessions:    &state.sessions,
                        query_acl:   &state.query_acl,
                        request_acl: &state.request_acl,
                    };
                    let _ = server::handle_connection(channel, &ctx);
                });
            }
        });

        Self { port, public, state }
    }

    fn start_open() -> Self {
        let mut query_acl = Acl::new();
        query_acl.allow_all(Rights::EXEC);
        let mut request_acl = Acl::new();
        request_acl.allow_all(Rights::EXEC);
        Self::start(query_acl, request_acl)
    }

    fn connect(&self, keys: &SignKeyPair, command: Command) -> Channel {
        client::connect_to("127.0.0.1", self.port, keys, &self.public, command).unwrap()
    }
}

// ─── Scenarios ────────────────────────────────────────────────────────────────

#[test]
fn basic_session_lifecycle() {
    let fixture = Fixture::start_open();
    let keys = SignKeyPair::generate().unwrap();

    // REQUEST: one session appears in the store.
    let mut channel = fixture.connect(&keys, Command::Request);
    let (identifier, cap) = client::request(&mut channel, b"hello").unwrap();
    drop(channel);
    assert_eq!(fixture.state.sessions.len(), 1);
    assert!(!cap.is_root());

    // CONNECT: the echo service sends the parameters back.
    let mut channel = fixture.connect(&keys, Command::Connect);
    client::start_session(&mut channel, identifier, &cap).unwrap();
    assert_eq!(channel.read_message(4096).unwrap(), b"hello");

    // The session was consumed.
    assert!(fixture.state.sessions.is_empty());
}

#[test]
fn query_describes_the_service() {
    let fixture = Fixture::start_open();
    let keys = SignKeyPair::generate().unwrap();

    let mut channel = fixture.connect(&keys, Command::Query);
    let description = client::query(&mut channel).unwrap();

    assert_eq!(description.name, "echo test");
    assert_eq!(description.kind, "echo");
    assert_eq!(description.category, "Test");
}

#[test]
fn unauthorized_request_is_denied() {
    let allowed = SignKeyPair::generate().unwrap();
    let mut request_acl = Acl::new();
    request_acl.allow(*allowed.public(), Rights::EXEC);
    let fixture = Fixture::start(Acl::new(), request_acl);

    let other = SignKeyPair::generate().unwrap();
    let mut channel = fixture.connect(&other, Command::Request);
    let result = client::request(&mut channel, b"hello");

    assert!(matches!(result, Err(client::ClientError::Channel(_))));
    assert!(fixture.state.sessions.is_empty());
}

#[test]
fn unauthorized_query_is_denied() {
    let fixture = Fixture::start(Acl::new(), Acl::new());
    let keys = SignKeyPair::generate().unwrap();

    let mut channel = fixture.connect(&keys, Command::Query);
    assert!(client::query(&mut channel).is_err());
}

#[test]
fn forged_capability_is_rejected() {
    let fixture = Fixture::start_open();
    let keys = SignKeyPair::generate().unwrap();

    let mut channel = fixture.connect(&keys, Command::Request);
    let (identifier, cap) = client::request(&mut channel, b"payload").unwrap();
    drop(channel);

    // Flip one byte of the secret.
    let mut message = cap.to_message();
    message.secret[0] ^= 0x01;
    let forged = Capability::from_message(&message);

    let mut channel = fixture.connect(&keys, Command::Connect);
    let result = client::start_session(&mut channel, identifier, &forged);
    assert!(matches!(result, Err(client::ClientError::Rejected(code)) if code != 0));

    // The session survives until a genuine CONNECT.
    assert_eq!(fixture.state.sessions.len(), 1);
    let mut channel = fixture.connect(&keys, Command::Connect);
    client::start_session(&mut channel, identifier, &cap).unwrap();
    assert!(fixture.state.sessions.is_empty());
}

#[test]
fn delegated_capability_admits_the_delegate() {
    let fixture = Fixture::start_open();
    let requester = SignKeyPair::generate().unwrap();
    let delegate = SignKeyPair::generate().unwrap();

    let mut channel = fixture.connect(&requester, Command::Request);
    let (identifier, cap) = client::request(&mut channel, b"shared").unwrap();
    drop(channel);

    // Pass the full rights on to the delegate, who connects under its own
    // identity.
    let delegated = cap.create_ref(Rights::ALL, delegate.public()).unwrap();
    let mut channel = fixture.connect(&delegate, Command::Connect);
    client::start_session(&mut channel, identifier, &delegated).unwrap();
    assert!(fixture.state.sessions.is_empty());
}

#[test]
fn rights_escalation_fails_at_delegation() {
    let fixture = Fixture::start_open();
    let keys = SignKeyPair::generate().unwrap();
    let third = SignKeyPair::generate().unwrap();

    let mut channel = fixture.connect(&keys, Command::Request);
    let (_, cap) = client::request(&mut channel, b"x").unwrap();
    drop(channel);

    // Granting an unknown right bit is an escalation over {EXEC, TERM}.
    let widened = Rights::from_bits(Rights::ALL.bits() | (1 << 4));
    assert_eq!(
        cap.create_ref(widened, third.public()),
        Err(CapabilityError::Escalation)
    );

    // Re-granting a right that was narrowed away is an escalation too.
    let narrowed = cap.create_ref(Rights::EXEC, third.public()).unwrap();
    assert_eq!(
        narrowed.create_ref(Rights::ALL, keys.public()),
        Err(CapabilityError::Escalation)
    );
}

#[test]
fn terminate_by_non_holder_is_silently_ignored() {
    let fixture = Fixture::start_open();
    let requester = SignKeyPair::generate().unwrap();
    let intruder = SignKeyPair::generate().unwrap();

    let mut channel = fixture.connect(&requester, Command::Request);
    let (identifier, _cap) = client::request(&mut channel, b"victim").unwrap();
    drop(channel);

    // A self-minted capability: right holder, wrong root.
    let fake = Capability::root()
        .unwrap()
        .create_ref(Rights::ALL, intruder.public())
        .unwrap();

    let mut channel = fixture.connect(&intruder, Command::Terminate);
    client::terminate(&mut channel, identifier, &fake).unwrap();
    drop(channel);

    // Give the handler a moment, then check the session survived.
    thread::sleep(std::time::Duration::from_millis(100));
    assert_eq!(fixture.state.sessions.len(), 1);
}

#[test]
fn terminate_by_holder_removes_the_session() {
    let fixture = Fixture::start_open();
    let keys = SignKeyPair::generate().unwrap();

    let mut channel = fixture.connect(&keys, Command::Request);
    let (identifier, cap) = client::request(&mut channel, b"doomed").unwrap();
    drop(channel);

    let mut channel = fixture.connect(&keys, Command::Terminate);
    client::terminate(&mut channel, identifier, &cap).unwrap();
    drop(channel);

    // Removal is asynchronous from the client's point of view.
    for _ in 0..50 {
        if fixture.state.sessions.is_empty() {
            return;
        }
        thread::sleep(std::time::Duration::from_millis(20));
    }
    panic!("session was not terminated");
}

#[test]
fn double_connect_admits_exactly_one() {
    let fixture = Fixture::start_open();
    let keys = SignKeyPair::generate().unwrap();

    let mut channel = fixture.connect(&keys, Command::Request);
    let (identifier, cap) = client::request(&mut channel, b"contended").unwrap();
    drop(channel);

    let mut first = fixture.connect(&keys, Command::Connect);
    let mut second = fixture.connect(&keys, Command::Connect);

    let cap_clone = cap.clone();
    let racer = thread::spawn(move || {
        let result = client::start_session(&mut first, identifier, &cap_clone);
        (result, first)
    });
    let second_result = client::start_session(&mut second, identifier, &cap);
    let (first_result, _first) = racer.join().unwrap();

    let successes = [&first_result, &second_result]
        .iter()
        .filter(|r| r.is_ok())
        .count();
    assert_eq!(successes, 1, "exactly one CONNECT may win");
    assert!(fixture.state.sessions.is_empty());
}

#[test]
fn request_parameters_reach_the_service_unchanged() {
    let fixture = Fixture::start_open();
    let keys = SignKeyPair::generate().unwrap();

    let payload: Vec<u8> = (0..512).map(|i| i as u8).collect();
    let mut channel = fixture.connect(&keys, Command::Request);
    let (identifier, cap) = client::request(&mut channel, &payload).unwrap();
    drop(channel);

    let mut channel = fixture.connect(&keys, Command::Connect);
    client::start_session(&mut channel, identifier, &cap).unwrap();
    assert_eq!(channel.read_message(4096).unwrap(), payload);
}
