// SPDX-FileCopyrightText: Copyright © 2020-2026 Endless Application Manager Developers
//
// SPDX-License-Identifier: MPL-2.0

//! A bus-visible handle for one in-flight install/update, registered at its
//! own object path under [`crate::environment::TRANSACTIONS_PATH`].
//!
//! State machine: `Open -> Running -> Terminal`. `Open` is the object as
//! `Install`/`Update` first registers it; `CompleteTransaction` supplies the
//! remaining parameters (bundle path, signature path, storage selection),
//! builds the concrete [`crate::transaction::Transaction`] and runs it;
//! whatever happens next (success, failure, `CancelTransaction`, or the
//! calling peer vanishing from the bus) is Terminal and unregisters the
//! object.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use eam_cancel::Token;
use eam_config::ConfigSnapshot;
use futures_util::StreamExt;
use log::warn;
use tokio::task::AbortHandle;
use zbus::object_server::SignalEmitter;
use zbus::zvariant::{ObjectPath, OwnedObjectPath, OwnedValue};
use zbus::ObjectServer;

use crate::appid::AppId;
use crate::tag::{BusError, Tag};
use crate::transaction::{Install, Transaction, Update};

/// Which shape of transaction this handle was allocated for. `Install`/
/// `Update` only - `Uninstall` is synchronous and never gets a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Install,
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    Running,
    Terminal,
}

/// Everything a handle needs to build its [`Transaction`] once
/// `CompleteTransaction` arrives, but doesn't have until then.
struct PendingParams {
    bundle: PathBuf,
    signature: Option<PathBuf>,
    storage: StorageSelection,
    source_storage: StorageSelection,
}

#[derive(Debug, Clone, Copy)]
enum StorageSelection {
    Primary,
    Secondary,
}

/// A handle registered on the bus for the lifetime of one install/update.
pub struct RemoteTxn {
    kind: Kind,
    app: AppId,
    config: ConfigSnapshot,
    cancel: Token,
    state: std::sync::Mutex<State>,
    completed: AtomicBool,
    on_terminal: Box<dyn Fn() + Send + Sync>,
    /// The task watching for the calling peer vanishing from the bus.
    /// Aborted once the handle reaches `Terminal` by any other route, so the
    /// watch doesn't outlive the transaction it was guarding.
    watch_abort: std::sync::Mutex<Option<AbortHandle>>,
}

impl RemoteTxn {
    /// Build a fresh handle in the `Open` state. `on_terminal` is invoked
    /// exactly once, when the handle reaches `Terminal`, so the daemon can
    /// decrement its busy counter.
    pub fn new(kind: Kind, app: AppId, config: ConfigSnapshot, cancel: Token, on_terminal: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            kind,
            app,
            config,
            cancel,
            state: std::sync::Mutex::new(State::Open),
            completed: AtomicBool::new(false),
            on_terminal: Box::new(on_terminal),
            watch_abort: std::sync::Mutex::new(None),
        }
    }

    /// Record the abort handle for this handle's peer-vanish watch task, so
    /// it can be torn down once the transaction reaches `Terminal` by some
    /// other route (completion or explicit cancel).
    pub fn set_watch_abort(&self, handle: AbortHandle) {
        *self.watch_abort.lock().unwrap() = Some(handle);
    }

    fn enter_terminal(&self) {
        let mut state = self.state.lock().unwrap();
        if *state != State::Terminal {
            *state = State::Terminal;
            drop(state);
            if let Some(handle) = self.watch_abort.lock().unwrap().take() {
                handle.abort();
            }
            if !self.completed.swap(true, Ordering::SeqCst) {
                (self.on_terminal)();
            }
        }
    }

    /// Called by the peer-vanish watch when the calling sender disappears
    /// from the bus before `CompleteTransaction` (or after, for a handle
    /// that is otherwise still `Open`/`Running`). No reply is possible - the
    /// in-flight method call, if any, is simply left to be dropped along
    /// with the connection - so this only trips the cancel token and tears
    /// the handle down.
    pub fn on_peer_vanished(&self) {
        self.cancel.cancel();
        self.enter_terminal();
    }

    fn parse_params(&self, opts: &HashMap<String, OwnedValue>) -> Result<PendingParams, BusError> {
        let bundle = opts
            .get("BundlePath")
            .and_then(|v| TryInto::<String>::try_into(v.clone()).ok())
            .map(PathBuf::from)
            .ok_or_else(|| Tag::ProtocolError.into_bus_error("BundlePath is required"))?;

        let signature = opts.get("SignaturePath").and_then(|v| TryInto::<String>::try_into(v.clone()).ok()).map(PathBuf::from);

        let storage_key = match self.kind {
            Kind::Install => "StorageType",
            Kind::Update => "TargetStorageType",
        };
        let storage = parse_storage(opts, storage_key)?;
        let source_storage = if self.kind == Kind::Update { parse_storage(opts, "SourceStorageType")? } else { storage };

        Ok(PendingParams { bundle, signature, storage, source_storage })
    }

    fn storage_dir(&self, selection: StorageSelection) -> PathBuf {
        match selection {
            StorageSelection::Primary => self.config.primary_storage.clone(),
            StorageSelection::Secondary => self.config.secondary_storage.clone(),
        }
    }

    fn build_transaction(&self, params: PendingParams) -> Transaction {
        let prefix = self.storage_dir(params.storage);
        match self.kind {
            Kind::Install => Transaction::Install(Install {
                app: self.app.clone(),
                prefix: prefix.clone(),
                bundle: params.bundle,
                signature: params.signature.unwrap_or_else(|| default_signature_path(&prefix, &self.app)),
                skip_sig: false,
            }),
            Kind::Update => {
                let src_prefix = self.storage_dir(params.source_storage);
                Transaction::Update(Update { app: self.app.clone(), src_prefix, tgt_prefix: prefix, bundle: params.bundle, signature: params.signature })
            }
        }
    }
}

fn parse_storage(opts: &HashMap<String, OwnedValue>, key: &str) -> Result<StorageSelection, BusError> {
    match opts.get(key).and_then(|v| TryInto::<String>::try_into(v.clone()).ok()).as_deref() {
        Some("primary") | None => Ok(StorageSelection::Primary),
        Some("secondary") => Ok(StorageSelection::Secondary),
        Some(other) => Err(Tag::ProtocolError.into_bus_error(format!("unknown storage type {other:?}"))),
    }
}

fn default_signature_path(prefix: &std::path::Path, app: &AppId) -> PathBuf {
    prefix.join(format!("{app}.asc"))
}

#[zbus::interface(name = "com.endlessm.AppManager.Transaction")]
impl RemoteTxn {
    async fn complete_transaction(
        &self,
        opts: HashMap<String, OwnedValue>,
        #[zbus(object_server)] server: &ObjectServer,
        #[zbus(signal_emitter)] ctxt: SignalEmitter<'_>,
    ) -> Result<bool, BusError> {
        {
            let mut state = self.state.lock().unwrap();
            if *state != State::Open {
                return Err(Tag::Failed.into_bus_error("CompleteTransaction already called for this handle"));
            }
            *state = State::Running;
        }

        let params = match self.parse_params(&opts) {
            Ok(p) => p,
            Err(e) => {
                self.enter_terminal();
                let _ = unregister(server, ctxt.path()).await;
                return Err(e);
            }
        };

        let txn = self.build_transaction(params);
        let result = txn.run(&self.config, &self.cancel).await;
        self.enter_terminal();
        let _ = unregister(server, ctxt.path()).await;

        match result {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!("transaction for {} failed: {e}", self.app);
                Err(e.tag().into_bus_error(e.to_string()))
            }
        }
    }

    async fn cancel_transaction(&self, #[zbus(object_server)] server: &ObjectServer, #[zbus(signal_emitter)] ctxt: SignalEmitter<'_>) {
        self.cancel.cancel();
        self.enter_terminal();
        let _ = unregister(server, ctxt.path()).await;
    }
}

async fn unregister(server: &ObjectServer, path: &ObjectPath<'_>) -> zbus::Result<bool> {
    server.remove::<RemoteTxn, _>(path).await
}

/// Spawn the per-handle peer-vanish watch: a subscription on the bus's own
/// `NameOwnerChanged` signal, scoped to `sender`. Runs until the sender
/// drops off the bus (`new_owner` goes empty) or the watch is aborted by
/// [`RemoteTxn::enter_terminal`] because the handle already reached
/// `Terminal` some other way.
///
/// Mirrors the source's per-remote-transaction `g_bus_watch_name` watch,
/// expressed as a zbus signal stream instead of a callback registration.
pub fn spawn_peer_watch(connection: zbus::Connection, sender: String, path: OwnedObjectPath) -> AbortHandle {
    let task = tokio::spawn(async move {
        let dbus = match zbus::fdo::DBusProxy::new(&connection).await {
            Ok(proxy) => proxy,
            Err(e) => {
                warn!("could not watch peer {sender} for vanish: {e}");
                return;
            }
        };
        let mut changes = match dbus.receive_name_owner_changed().await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("could not subscribe to NameOwnerChanged while watching {sender}: {e}");
                return;
            }
        };

        while let Some(signal) = changes.next().await {
            let Ok(args) = signal.args() else { continue };
            if args.name() != sender.as_str() {
                continue;
            }
            let vanished = args.new_owner().as_ref().map(|owner| owner.as_str().is_empty()).unwrap_or(true);
            if !vanished {
                continue;
            }

            let server = connection.object_server();
            if let Ok(iface_ref) = server.interface::<_, RemoteTxn>(path.as_ref()).await {
                iface_ref.get().await.on_peer_vanished();
            }
            let _ = server.remove::<RemoteTxn, _>(path.as_ref()).await;
            break;
        }
    });
    task.abort_handle()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_key_depends_on_kind() {
        let config = ConfigSnapshot::default();
        let app: AppId = "com.example.App".parse().unwrap();
        let install = RemoteTxn::new(Kind::Install, app.clone(), config.clone(), Token::new(), || {});
        let update = RemoteTxn::new(Kind::Update, app, config, Token::new(), || {});

        let mut opts = HashMap::new();
        opts.insert("BundlePath".to_string(), OwnedValue::try_from("/tmp/a.bundle").unwrap());
        opts.insert("TargetStorageType".to_string(), OwnedValue::try_from("secondary").unwrap());

        assert!(matches!(install.parse_params(&opts).unwrap().storage, StorageSelection::Primary));
        assert!(matches!(update.parse_params(&opts).unwrap().storage, StorageSelection::Secondary));
    }

    #[test]
    fn missing_bundle_path_is_a_protocol_error() {
        let config = ConfigSnapshot::default();
        let app: AppId = "com.example.App".parse().unwrap();
        let txn = RemoteTxn::new(Kind::Install, app, config, Token::new(), || {});
        assert!(txn.parse_params(&HashMap::new()).is_err());
    }

    #[test]
    fn peer_vanish_trips_cancel_and_fires_on_terminal_exactly_once() {
        let config = ConfigSnapshot::default();
        let app: AppId = "com.example.App".parse().unwrap();
        let cancel = Token::new();
        let fired = std::sync::Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();
        let txn = RemoteTxn::new(Kind::Install, app, config, cancel.clone(), move || {
            fired_clone.store(true, Ordering::SeqCst);
        });

        txn.on_peer_vanished();
        assert!(cancel.check().is_err());
        assert!(fired.load(Ordering::SeqCst));

        // A second route into Terminal (e.g. CancelTransaction racing the
        // watch) must not fire on_terminal again.
        fired.store(false, Ordering::SeqCst);
        txn.enter_terminal();
        assert!(!fired.load(Ordering::SeqCst));
    }
}
