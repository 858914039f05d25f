//! # Interface Manager
//!
//! Owns the radio. Scanner and harvester never touch the mode directly: they ask for a
//! [`Lease`] of the right kind, and the manager makes sure only one exists at a time and
//! that the interface sits in the mode that kind needs.
//!
//! The state lives in a `tokio::sync::watch` channel. Claims are made with
//! `send_if_modified`, so checking for a free interface and taking it is one step.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use harvestr_common::error::InterfaceError;
use harvestr_common::models::interface::{InterfaceMode, InterfaceState, LeaseHolder, LeaseKind};
use harvestr_common::network::interface::find_interface;
use is_root::is_root;
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// The privileged operations behind a mode switch.
#[async_trait]
pub trait ModeControl: Send + Sync {
    async fn current_mode(&self, interface: &str) -> Result<InterfaceMode, InterfaceError>;

    /// Puts `interface` into `mode`, which is `Managed` or `Monitor`.
    async fn set_mode(&self, interface: &str, mode: InterfaceMode) -> Result<(), InterfaceError>;

    async fn set_channel(&self, interface: &str, channel: u8) -> Result<(), InterfaceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeasePolicy {
    /// Mode a scan lease needs. Harvest leases always need monitor mode.
    pub scan_mode: InterfaceMode,
    /// Upper bound on waiting for a lease.
    pub timeout: Duration,
}

#[derive(Clone)]
pub struct InterfaceManager {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    control: Arc<dyn ModeControl>,
    state: watch::Sender<InterfaceState>,
    policy: LeasePolicy,
}

impl InterfaceManager {
    pub fn new(
        name: impl Into<String>,
        control: Arc<dyn ModeControl>,
        policy: LeasePolicy,
        mode: InterfaceMode,
    ) -> Self {
        let (state, _) = watch::channel(InterfaceState::new(mode));
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                control,
                state,
                policy,
            }),
        }
    }

    /// Builds a manager starting from the mode the interface is in right now.
    pub async fn connect(
        name: impl Into<String>,
        control: Arc<dyn ModeControl>,
        policy: LeasePolicy,
    ) -> Result<Self, InterfaceError> {
        let name = name.into();
        let mode = control.current_mode(&name).await?;
        debug!(interface = %name, %mode, "interface manager ready");
        Ok(Self::new(name, control, policy, mode))
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn state(&self) -> InterfaceState {
        *self.inner.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<InterfaceState> {
        self.inner.state.subscribe()
    }

    pub fn required_mode(&self, kind: LeaseKind) -> InterfaceMode {
        match kind {
            LeaseKind::Scan => self.inner.policy.scan_mode,
            LeaseKind::Harvest => InterfaceMode::Monitor,
        }
    }

    /// Switches the interface outside of any lease.
    ///
    /// A no-op when already in `mode`. Fails with [`InterfaceError::Busy`] while a lease
    /// is held or another transition is running.
    pub async fn set_mode(&self, mode: InterfaceMode) -> Result<(), InterfaceError> {
        if mode == InterfaceMode::Transitioning {
            return Err(InterfaceError::Busy("transitioning is not a target mode".into()));
        }

        let mut from = None;
        let mut already = false;
        self.inner.state.send_if_modified(|s| {
            if s.mode == mode {
                already = true;
                return false;
            }
            if s.holder != LeaseHolder::None || s.mode == InterfaceMode::Transitioning {
                return false;
            }
            from = Some(s.mode);
            s.mode = InterfaceMode::Transitioning;
            true
        });

        if already {
            return Ok(());
        }
        let Some(from) = from else {
            return Err(InterfaceError::Busy(format!(
                "cannot switch {} to {mode} while a lease is held",
                self.inner.name
            )));
        };
        self.transition(from, mode).await
    }

    /// Waits for the interface to be free and in the right mode for `kind`.
    ///
    /// Harvest requests are queued ahead of scans: while one is pending no new scan
    /// lease is granted, and the current scan lease reports [`Lease::should_yield`].
    pub async fn acquire_lease(&self, kind: LeaseKind) -> Result<Lease, InterfaceError> {
        let timeout = self.inner.policy.timeout;
        let lease = tokio::time::timeout(timeout, self.claim(kind))
            .await
            .map_err(|_| {
                InterfaceError::Busy(format!("no {kind} lease on {} within {timeout:?}", self.inner.name))
            })??;

        let required = self.required_mode(kind);
        let current = self.state().mode;
        if current != required {
            self.inner.state.send_modify(|s| s.mode = InterfaceMode::Transitioning);
            // Dropping `lease` on failure hands the interface back.
            self.transition(current, required).await?;
        }
        Ok(lease)
    }

    async fn claim(&self, kind: LeaseKind) -> Result<Lease, InterfaceError> {
        let _pending = (kind == LeaseKind::Harvest).then(|| PendingHarvest::register(&self.inner.state));
        let mut rx = self.inner.state.subscribe();

        loop {
            let claimed = self.inner.state.send_if_modified(|s| {
                let scan_must_wait = kind == LeaseKind::Scan && s.pending_harvests > 0;
                if s.holder != LeaseHolder::None
                    || s.mode == InterfaceMode::Transitioning
                    || scan_must_wait
                {
                    return false;
                }
                s.holder = kind.into();
                true
            });

            if claimed {
                debug!(interface = %self.inner.name, %kind, "lease granted");
                return Ok(Lease {
                    kind,
                    manager: self.clone(),
                });
            }

            rx.changed()
                .await
                .map_err(|_| InterfaceError::Busy("interface manager closed".into()))?;
        }
    }

    async fn transition(&self, from: InterfaceMode, to: InterfaceMode) -> Result<(), InterfaceError> {
        info!(interface = %self.inner.name, "switching {from} -> {to}");
        let mut guard = TransitionGuard {
            state: &self.inner.state,
            fallback: from,
            armed: true,
        };

        let result = self.inner.control.set_mode(&self.inner.name, to).await;
        guard.armed = false;

        match &result {
            Ok(()) => self.inner.state.send_modify(|s| s.mode = to),
            Err(e) => {
                warn!(interface = %self.inner.name, "mode switch to {to} failed: {e}");
                self.inner.state.send_modify(|s| s.mode = from);
            }
        }
        result
    }
}

/// Exclusive use of the interface. Dropping it frees the interface.
pub struct Lease {
    kind: LeaseKind,
    manager: InterfaceManager,
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("kind", &self.kind)
            .field("interface", &self.manager.inner.name)
            .finish()
    }
}

impl Lease {
    pub fn kind(&self) -> LeaseKind {
        self.kind
    }

    pub fn interface(&self) -> &str {
        &self.manager.inner.name
    }

    /// True for a scan lease once a harvest is waiting. Checked between scan cycles.
    pub fn should_yield(&self) -> bool {
        self.kind == LeaseKind::Scan && self.manager.inner.state.borrow().pending_harvests > 0
    }

    /// Resolves once [`Lease::should_yield`] turns true. Never resolves for harvest leases.
    pub async fn yield_requested(&self) {
        if self.kind != LeaseKind::Scan {
            return std::future::pending().await;
        }
        let mut rx = self.manager.subscribe();
        if rx.wait_for(|s| s.pending_harvests > 0).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    pub async fn tune(&self, channel: u8) -> Result<(), InterfaceError> {
        self.manager
            .inner
            .control
            .set_channel(&self.manager.inner.name, channel)
            .await
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.manager.inner.state.send_modify(|s| s.holder = LeaseHolder::None);
        debug!(interface = %self.manager.inner.name, kind = %self.kind, "lease released");
    }
}

struct PendingHarvest<'a>(&'a watch::Sender<InterfaceState>);

impl<'a> PendingHarvest<'a> {
    fn register(state: &'a watch::Sender<InterfaceState>) -> Self {
        state.send_modify(|s| s.pending_harvests += 1);
        Self(state)
    }
}

impl Drop for PendingHarvest<'_> {
    fn drop(&mut self) {
        self.0
            .send_modify(|s| s.pending_harvests = s.pending_harvests.saturating_sub(1));
    }
}

/// Puts the old mode back if a transition future is dropped halfway.
struct TransitionGuard<'a> {
    state: &'a watch::Sender<InterfaceState>,
    fallback: InterfaceMode,
    armed: bool,
}

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let fallback = self.fallback;
            self.state.send_modify(|s| s.mode = fallback);
        }
    }
}

// ==================================================================
// iw / ip
// ==================================================================

/// Switches modes with `ip link` and `iw`, the way it is done by hand.
#[derive(Debug, Default, Clone, Copy)]
pub struct IwModeControl;

impl IwModeControl {
    /// Checks that `interface` exists and that we may reconfigure it.
    pub fn preflight(interface: &str) -> Result<(), InterfaceError> {
        if find_interface(interface).is_none() {
            return Err(InterfaceError::DeviceMissing(interface.to_string()));
        }
        if !is_root() {
            return Err(InterfaceError::PermissionDenied(format!(
                "changing {interface} requires root"
            )));
        }
        Ok(())
    }

    async fn run(program: &str, args: &[&str]) -> Result<String, InterfaceError> {
        let command = format!("{program} {}", args.join(" "));
        debug!("running `{command}`");
        let output = Command::new(program).args(args).output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(classify_failure(command, output.status.code().unwrap_or(-1), stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl ModeControl for IwModeControl {
    async fn current_mode(&self, interface: &str) -> Result<InterfaceMode, InterfaceError> {
        if find_interface(interface).is_none() {
            return Err(InterfaceError::DeviceMissing(interface.to_string()));
        }
        let info = Self::run("iw", &["dev", interface, "info"]).await?;
        Ok(parse_iw_info_mode(&info).unwrap_or(InterfaceMode::Managed))
    }

    async fn set_mode(&self, interface: &str, mode: InterfaceMode) -> Result<(), InterfaceError> {
        Self::preflight(interface)?;
        let kind = match mode {
            InterfaceMode::Monitor => "monitor",
            InterfaceMode::Managed => "managed",
            InterfaceMode::Transitioning => {
                return Err(InterfaceError::Busy("transitioning is not a target mode".into()));
            }
        };

        Self::run("ip", &["link", "set", interface, "down"]).await?;
        let switched = Self::run("iw", &["dev", interface, "set", "type", kind]).await;
        let up = Self::run("ip", &["link", "set", interface, "up"]).await;
        switched?;
        up?;
        Ok(())
    }

    async fn set_channel(&self, interface: &str, channel: u8) -> Result<(), InterfaceError> {
        Self::run("iw", &["dev", interface, "set", "channel", &channel.to_string()]).await?;
        Ok(())
    }
}

pub(crate) fn classify_failure(command: String, status: i32, stderr: String) -> InterfaceError {
    if stderr.contains("Operation not permitted") || stderr.contains("Permission denied") {
        InterfaceError::PermissionDenied(format!("`{command}`: {stderr}"))
    } else if stderr.contains("No such device") {
        InterfaceError::DeviceMissing(command)
    } else {
        InterfaceError::Command {
            command,
            status,
            stderr,
        }
    }
}

/// Reads the `type` line of `iw dev <if> info`.
pub fn parse_iw_info_mode(info: &str) -> Option<InterfaceMode> {
    info.lines()
        .filter_map(|line| line.trim().strip_prefix("type "))
        .find_map(|kind| match kind.trim() {
            "monitor" => Some(InterfaceMode::Monitor),
            "managed" | "station" => Some(InterfaceMode::Managed),
            _ => None,
        })
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct FakeControl {
        calls: Mutex<Vec<InterfaceMode>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl ModeControl for FakeControl {
        async fn current_mode(&self, _: &str) -> Result<InterfaceMode, InterfaceError> {
            Ok(InterfaceMode::Managed)
        }

        async fn set_mode(&self, interface: &str, mode: InterfaceMode) -> Result<(), InterfaceError> {
            self.calls.lock().unwrap().push(mode);
            if self.fail.load(Ordering::SeqCst) {
                return Err(InterfaceError::PermissionDenied(interface.to_string()));
            }
            Ok(())
        }

        async fn set_channel(&self, _: &str, _: u8) -> Result<(), InterfaceError> {
            Ok(())
        }
    }

    fn manager(control: Arc<FakeControl>) -> InterfaceManager {
        let policy = LeasePolicy {
            scan_mode: InterfaceMode::Monitor,
            timeout: Duration::from_secs(5),
        };
        InterfaceManager::new("wlan0", control, policy, InterfaceMode::Managed)
    }

    #[tokio::test]
    async fn lease_switches_mode_and_release_frees_interface() {
        let control = Arc::new(FakeControl::default());
        let manager = manager(control.clone());

        let lease = manager.acquire_lease(LeaseKind::Scan).await.unwrap();
        assert_eq!(manager.state().mode, InterfaceMode::Monitor);
        assert_eq!(manager.state().holder, LeaseHolder::Scan);
        assert_eq!(*control.calls.lock().unwrap(), vec![InterfaceMode::Monitor]);

        drop(lease);
        assert!(manager.state().is_idle());

        // Already in monitor mode: no second switch.
        let _lease = manager.acquire_lease(LeaseKind::Harvest).await.unwrap();
        assert_eq!(control.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn harvest_request_waits_for_scan_to_yield() {
        let manager = manager(Arc::new(FakeControl::default()));
        let scan = manager.acquire_lease(LeaseKind::Scan).await.unwrap();
        assert!(!scan.should_yield());

        let waiter = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.acquire_lease(LeaseKind::Harvest).await })
        };

        scan.yield_requested().await;
        assert!(scan.should_yield());
        assert_eq!(manager.state().holder, LeaseHolder::Scan);

        drop(scan);
        let harvest = waiter.await.unwrap().unwrap();
        assert_eq!(harvest.kind(), LeaseKind::Harvest);
        assert_eq!(manager.state().holder, LeaseHolder::Harvest);
        assert_eq!(manager.state().pending_harvests, 0);
    }

    #[tokio::test]
    async fn new_scans_wait_behind_pending_harvest() {
        let manager = manager(Arc::new(FakeControl::default()));
        let scan = manager.acquire_lease(LeaseKind::Scan).await.unwrap();

        let harvest = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.acquire_lease(LeaseKind::Harvest).await })
        };
        scan.yield_requested().await;

        let second_scan = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.acquire_lease(LeaseKind::Scan).await })
        };
        tokio::task::yield_now().await;
        drop(scan);

        let harvest = harvest.await.unwrap().unwrap();
        assert!(!second_scan.is_finished());
        drop(harvest);

        let scan = second_scan.await.unwrap().unwrap();
        assert_eq!(scan.kind(), LeaseKind::Scan);
    }

    #[tokio::test(start_paused = true)]
    async fn lease_wait_is_bounded() {
        let manager = manager(Arc::new(FakeControl::default()));
        let _held = manager.acquire_lease(LeaseKind::Harvest).await.unwrap();

        let err = manager.acquire_lease(LeaseKind::Harvest).await.unwrap_err();
        assert!(matches!(err, InterfaceError::Busy(_)));
        assert_eq!(manager.state().pending_harvests, 0);
    }

    #[tokio::test]
    async fn set_mode_is_idempotent_and_refused_under_lease() {
        let control = Arc::new(FakeControl::default());
        let manager = manager(control.clone());

        manager.set_mode(InterfaceMode::Managed).await.unwrap();
        assert!(control.calls.lock().unwrap().is_empty());

        let lease = manager.acquire_lease(LeaseKind::Scan).await.unwrap();
        let err = manager.set_mode(InterfaceMode::Managed).await.unwrap_err();
        assert!(matches!(err, InterfaceError::Busy(_)));

        drop(lease);
        manager.set_mode(InterfaceMode::Managed).await.unwrap();
        assert_eq!(manager.state().mode, InterfaceMode::Managed);
    }

    #[tokio::test]
    async fn failed_switch_keeps_old_mode_and_frees_lease() {
        let control = Arc::new(FakeControl::default());
        control.fail.store(true, Ordering::SeqCst);
        let manager = manager(control);

        let err = manager.acquire_lease(LeaseKind::Scan).await.unwrap_err();
        assert!(matches!(err, InterfaceError::PermissionDenied(_)));
        assert_eq!(manager.state().mode, InterfaceMode::Managed);
        assert!(manager.state().is_idle());
    }

    #[test]
    fn reads_mode_from_iw_info() {
        let info = "Interface wlan0mon\n\tifindex 5\n\ttype monitor\n\tchannel 6 (2437 MHz)\n";
        assert_eq!(parse_iw_info_mode(info), Some(InterfaceMode::Monitor));
        assert_eq!(parse_iw_info_mode("\ttype managed\n"), Some(InterfaceMode::Managed));
        assert_eq!(parse_iw_info_mode("nothing"), None);
    }
}
