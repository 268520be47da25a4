//! Integration tests for the session over a scripted host adapter.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;

use btlink::{
    AcceptedConnection, AdapterState, AlwaysGranted, BondState, Config, DeviceAddress, Error,
    HostAdapter, HostEvent, HostListener, Permission, PermissionDecision, PermissionHost,
    RemoteDevice, Session, SessionEvent, SppService,
};

/// Host adapter scripted from the test body.
#[derive(Default)]
struct FakeHost {
    powered: Mutex<bool>,
    discovering: Mutex<bool>,
    fail_discovery: Mutex<bool>,
    devices: Mutex<HashMap<DeviceAddress, RemoteDevice>>,
    alias: Mutex<Option<String>>,
    power_calls: Mutex<Vec<bool>>,
    discovery_calls: Mutex<Vec<&'static str>>,
    pair_requests: Mutex<Vec<DeviceAddress>>,
    bound_services: Mutex<Vec<SppService>>,
    listeners: Mutex<VecDeque<Box<dyn HostListener>>>,
    subscribers: Mutex<Vec<mpsc::Sender<HostEvent>>>,
}

impl FakeHost {
    fn powered_on() -> Arc<Self> {
        let host = Self::default();
        *host.powered.lock() = true;
        Arc::new(host)
    }

    fn insert_device(&self, device: RemoteDevice) {
        self.devices.lock().insert(device.address, device);
    }

    fn push_listener(&self, listener: Box<dyn HostListener>) {
        self.listeners.lock().push_back(listener);
    }

    /// Deliver a host notification to every live subscription.
    async fn emit(&self, event: HostEvent) {
        let subscribers = self.subscribers.lock().clone();
        for tx in subscribers {
            let _ = tx.send(event.clone()).await;
        }
    }
}

#[async_trait]
impl HostAdapter for FakeHost {
    async fn is_powered(&self) -> io::Result<bool> {
        Ok(*self.powered.lock())
    }

    async fn set_powered(&self, on: bool) -> io::Result<()> {
        self.power_calls.lock().push(on);
        *self.powered.lock() = on;
        Ok(())
    }

    async fn set_alias(&self, alias: &str) -> io::Result<()> {
        *self.alias.lock() = Some(alias.to_string());
        Ok(())
    }

    async fn start_discovery(&self) -> io::Result<()> {
        self.discovery_calls.lock().push("start");
        if *self.fail_discovery.lock() {
            return Err(io::Error::other("scan refused"));
        }
        *self.discovering.lock() = true;
        Ok(())
    }

    async fn cancel_discovery(&self) -> io::Result<()> {
        self.discovery_calls.lock().push("cancel");
        *self.discovering.lock() = false;
        Ok(())
    }

    async fn resolve_device(&self, address: DeviceAddress) -> io::Result<RemoteDevice> {
        Ok(self
            .devices
            .lock()
            .get(&address)
            .cloned()
            .unwrap_or_else(|| RemoteDevice::unknown(address)))
    }

    async fn pair_device(&self, address: DeviceAddress) -> io::Result<()> {
        self.pair_requests.lock().push(address);
        Ok(())
    }

    async fn subscribe_events(&self) -> io::Result<mpsc::Receiver<HostEvent>> {
        let (tx, rx) = mpsc::channel(16);
        self.subscribers.lock().push(tx);
        Ok(rx)
    }

    async fn bind_service(&self, service: &SppService) -> io::Result<Box<dyn HostListener>> {
        if !*self.powered.lock() {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "adapter is powered off",
            ));
        }
        self.bound_services.lock().push(service.clone());
        Ok(self
            .listeners
            .lock()
            .pop_front()
            .unwrap_or_else(|| Box::new(IdleListener)))
    }
}

/// Listener that never produces a connection.
struct IdleListener;

#[async_trait]
impl HostListener for IdleListener {
    async fn accept(&mut self) -> io::Result<AcceptedConnection> {
        std::future::pending().await
    }
}

/// Listener fed connections from the test body.
struct ChannelListener {
    inbound: mpsc::Receiver<io::Result<AcceptedConnection>>,
}

impl ChannelListener {
    fn new() -> (mpsc::Sender<io::Result<AcceptedConnection>>, Box<Self>) {
        let (tx, rx) = mpsc::channel(8);
        (tx, Box::new(Self { inbound: rx }))
    }
}

#[async_trait]
impl HostListener for ChannelListener {
    async fn accept(&mut self) -> io::Result<AcceptedConnection> {
        match self.inbound.recv().await {
            Some(result) => result,
            // Script exhausted: behave like an idle listener.
            None => std::future::pending().await,
        }
    }
}

/// Permission host that refuses everything.
struct Denying {
    dialog_shown: bool,
    requests: Mutex<Vec<Permission>>,
}

impl Denying {
    fn new(dialog_shown: bool) -> Self {
        Self {
            dialog_shown,
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl PermissionHost for Denying {
    async fn request(&self, permission: Permission) -> PermissionDecision {
        self.requests.lock().push(permission);
        PermissionDecision::denied(self.dialog_shown)
    }
}

fn addr(s: &str) -> DeviceAddress {
    s.parse().unwrap()
}

fn named_device(s: &str, name: &str, bond: BondState) -> RemoteDevice {
    RemoteDevice {
        address: addr(s),
        name: Some(name.to_string()),
        bond,
    }
}

fn connection(peer: &str) -> AcceptedConnection {
    let (stream, _other_end) = tokio::io::duplex(64);
    AcceptedConnection {
        peer: addr(peer),
        stream: Box::new(stream),
    }
}

async fn session_over(host: Arc<FakeHost>) -> Session {
    Session::with_host(Some(host as Arc<dyn HostAdapter>), Config::default()).await
}

async fn wait_for_event(rx: &mut broadcast::Receiver<SessionEvent>) -> SessionEvent {
    timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for session event")
        .expect("event stream closed")
}

#[tokio::test]
async fn test_events_fan_out_to_all_subscribers_in_order() {
    let host = FakeHost::powered_on();
    let session = session_over(host.clone()).await;
    let mut first = session.subscribe();
    let mut second = session.subscribe();

    let found = named_device("00:11:22:33:44:01", "Watch", BondState::None);
    host.emit(HostEvent::DeviceFound(found.clone())).await;
    host.emit(HostEvent::AdapterStateChanged(AdapterState::Off))
        .await;
    host.emit(HostEvent::DiscoveryFinished).await;

    for rx in [&mut first, &mut second] {
        assert_eq!(
            wait_for_event(rx).await,
            SessionEvent::DeviceFound(found.clone())
        );
        assert_eq!(
            wait_for_event(rx).await,
            SessionEvent::AdapterStateChanged { enabled: false }
        );
        assert_eq!(wait_for_event(rx).await, SessionEvent::DiscoveryFinished);
    }
}

#[tokio::test]
async fn test_bond_transitions_map_to_paired_and_unpaired() {
    let host = FakeHost::powered_on();
    let session = session_over(host.clone()).await;
    let mut events = session.subscribe();

    let device = named_device("00:11:22:33:44:02", "Keyboard", BondState::Bonded);
    host.emit(HostEvent::BondStateChanged {
        device: device.clone(),
        previous: BondState::Bonding,
        current: BondState::Bonded,
    })
    .await;
    assert_eq!(
        wait_for_event(&mut events).await,
        SessionEvent::Paired(device.clone())
    );

    host.emit(HostEvent::BondStateChanged {
        device: device.clone(),
        previous: BondState::Bonded,
        current: BondState::None,
    })
    .await;
    assert_eq!(wait_for_event(&mut events).await, SessionEvent::Unpaired(device));
}

#[tokio::test]
async fn test_bonding_start_is_not_broadcast() {
    let host = FakeHost::powered_on();
    let session = session_over(host.clone()).await;
    let mut events = session.subscribe();

    let device = named_device("00:11:22:33:44:03", "Speaker", BondState::Bonding);
    host.emit(HostEvent::BondStateChanged {
        device,
        previous: BondState::None,
        current: BondState::Bonding,
    })
    .await;
    host.emit(HostEvent::DiscoveryFinished).await;

    // The first visible event skips the in-progress transition.
    assert_eq!(wait_for_event(&mut events).await, SessionEvent::DiscoveryFinished);
}

#[tokio::test]
async fn test_request_discovery_cancels_then_starts() {
    let host = FakeHost::powered_on();
    let session = session_over(host.clone()).await;

    session.request_discovery(&AlwaysGranted).await.unwrap();

    assert_eq!(*host.discovery_calls.lock(), vec!["cancel", "start"]);
    assert!(*host.discovering.lock());
}

#[tokio::test]
async fn test_request_discovery_denied_without_dialog() {
    let host = FakeHost::powered_on();
    let session = session_over(host.clone()).await;
    let permissions = Denying::new(false);

    let err = session.request_discovery(&permissions).await.unwrap_err();
    match err {
        Error::PermissionDenied {
            permission,
            dialog_shown,
        } => {
            assert_eq!(permission, Permission::DeviceDiscovery);
            assert!(!dialog_shown);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    assert_eq!(*permissions.requests.lock(), vec![Permission::DeviceDiscovery]);
    // Denial must leave the radio untouched.
    assert!(host.discovery_calls.lock().is_empty());
}

#[tokio::test]
async fn test_request_discovery_denied_after_dialog() {
    let host = FakeHost::powered_on();
    let session = session_over(host.clone()).await;
    let permissions = Denying::new(true);

    let err = session.request_discovery(&permissions).await.unwrap_err();
    assert!(matches!(
        err,
        Error::PermissionDenied {
            dialog_shown: true,
            ..
        }
    ));
}

#[tokio::test]
async fn test_request_discovery_surfaces_host_refusal() {
    let host = FakeHost::powered_on();
    *host.fail_discovery.lock() = true;
    let session = session_over(host.clone()).await;

    let err = session.request_discovery(&AlwaysGranted).await.unwrap_err();
    assert!(matches!(err, Error::Io(_)));
    assert_eq!(*host.discovery_calls.lock(), vec!["cancel", "start"]);
}

#[tokio::test]
async fn test_one_server_per_session() {
    let host = FakeHost::powered_on();
    let session = session_over(host.clone()).await;

    let _connections = session.open_spp_server().await.unwrap();
    assert!(matches!(
        session.open_spp_server().await,
        Err(Error::AlreadyListening)
    ));

    // Close and reopen is allowed.
    session.close_server().await;
    session.open_spp_server().await.unwrap();

    let bound = host.bound_services.lock();
    assert_eq!(bound.len(), 2);
    assert_eq!(bound[0].name, "btlink");
    assert_eq!(bound[0].channel, 1);
}

#[tokio::test]
async fn test_server_requires_powered_adapter() {
    let host = Arc::new(FakeHost::default());
    let session = session_over(host).await;

    assert!(matches!(session.open_spp_server().await, Err(Error::Io(_))));
}

#[tokio::test]
async fn test_connections_arrive_in_accept_order() {
    let host = FakeHost::powered_on();
    let (inbound, listener) = ChannelListener::new();
    host.push_listener(listener);
    let session = session_over(host).await;

    let mut connections = session.open_spp_server().await.unwrap();
    inbound.send(Ok(connection("00:11:22:33:44:01"))).await.unwrap();

    // A rejected second open must not disturb the running server.
    assert!(matches!(
        session.open_spp_server().await,
        Err(Error::AlreadyListening)
    ));
    inbound.send(Ok(connection("00:11:22:33:44:02"))).await.unwrap();

    let first = timeout(Duration::from_secs(1), connections.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.peer, addr("00:11:22:33:44:01"));
    let second = timeout(Duration::from_secs(1), connections.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.peer, addr("00:11:22:33:44:02"));
}

#[tokio::test]
async fn test_close_server_completes_promptly() {
    let host = FakeHost::powered_on();
    let session = session_over(host).await;

    let mut connections = session.open_spp_server().await.unwrap();
    timeout(Duration::from_secs(1), session.close_server())
        .await
        .unwrap();

    // The connection channel ends with the server.
    let ended = timeout(Duration::from_secs(1), connections.recv())
        .await
        .unwrap();
    assert!(ended.is_none());

    // Closing an already closed server is a no-op.
    timeout(Duration::from_secs(1), session.close_server())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_unsupported_host_degrades() {
    let session = Session::with_host(None, Config::default()).await;

    assert!(!session.adapter().is_supported());
    assert!(!session.adapter().is_enabled().await);
    assert!(session
        .adapter()
        .resolve_device(addr("00:11:22:33:44:05"))
        .await
        .is_none());
    assert!(matches!(
        session.request_discovery(&AlwaysGranted).await,
        Err(Error::Unsupported)
    ));
    assert!(matches!(
        session.open_spp_server().await,
        Err(Error::Unsupported)
    ));

    session.shutdown().await;
}

#[tokio::test]
async fn test_pairing_skips_already_bonded_device() {
    let host = FakeHost::powered_on();
    let bonded = named_device("00:11:22:33:44:06", "Headset", BondState::Bonded);
    host.insert_device(bonded.clone());
    let session = session_over(host.clone()).await;

    session.adapter().pair_device(bonded.address).await.unwrap();
    assert!(host.pair_requests.lock().is_empty());

    let fresh = addr("00:11:22:33:44:07");
    session.adapter().pair_device(fresh).await.unwrap();
    assert_eq!(*host.pair_requests.lock(), vec![fresh]);
}

#[tokio::test]
async fn test_set_enabled_skips_redundant_change() {
    let host = FakeHost::powered_on();
    let session = session_over(host.clone()).await;

    session.adapter().set_enabled(true).await.unwrap();
    assert!(host.power_calls.lock().is_empty());

    session.adapter().set_enabled(false).await.unwrap();
    assert_eq!(*host.power_calls.lock(), vec![false]);
}

#[tokio::test]
async fn test_configured_name_is_applied() {
    let host = FakeHost::powered_on();
    let config = Config {
        device_name: Some("Bench".to_string()),
        ..Config::default()
    };
    let _session = Session::with_host(Some(host.clone() as Arc<dyn HostAdapter>), config).await;

    assert_eq!(host.alias.lock().as_deref(), Some("Bench"));
}

#[tokio::test]
async fn test_no_events_after_shutdown() {
    let host = FakeHost::powered_on();
    let session = session_over(host.clone()).await;
    let mut events = session.subscribe();

    session.shutdown().await;
    host.emit(HostEvent::DiscoveryFinished).await;

    assert!(timeout(Duration::from_millis(200), events.recv())
        .await
        .is_err());
}
