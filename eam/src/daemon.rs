// SPDX-FileCopyrightText: Copyright © 2020-2026 Endless Application Manager Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The root bus object: name ownership, busy accounting, idle shutdown, and
//! signal-triggered shutdown.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use eam_cancel::Token;
use eam_config::ConfigSnapshot;
use log::{info, warn};
use thiserror::Error;
use zbus::zvariant::Value;
use zbus_polkit::policy1::AuthorityProxy;

use crate::appid::AppId;
use crate::auth::{self, Capability};
use crate::environment::{BUS_NAME, IDLE_TICK, ROOT_PATH, TRANSACTIONS_PATH};
use crate::remote_txn::{Kind, RemoteTxn};
use crate::tag::{BusError, Tag};
use crate::transaction::{Transaction, Uninstall};

/// Shared state behind the root object, plus the bookkeeping the idle timer
/// and signal handler both need to see.
struct Shared {
    config: RwLock<ConfigSnapshot>,
    busy: AtomicU64,
    last_activity: Mutex<Instant>,
    next_txn_id: AtomicU64,
    /// Cancel tokens of every in-flight transaction, keyed by the id that
    /// also names its object path segment (or, for the synchronous
    /// uninstall call, its own private counter value). Drained and tripped
    /// on shutdown so no transaction survives the daemon that started it.
    cancel_tokens: Mutex<Vec<(u64, Token)>>,
}

impl Shared {
    fn touch(&self) {
        *self.last_activity.lock().unwrap() = Instant::now();
    }

    fn idle_for(&self) -> std::time::Duration {
        self.last_activity.lock().unwrap().elapsed()
    }

    fn register_cancel(&self, id: u64, token: Token) {
        self.cancel_tokens.lock().unwrap().push((id, token));
    }

    fn unregister_cancel(&self, id: u64) {
        self.cancel_tokens.lock().unwrap().retain(|(tid, _)| *tid != id);
    }

    /// Trip every still-registered cancel token. Called once, on shutdown.
    fn cancel_all(&self) {
        for (_, token) in self.cancel_tokens.lock().unwrap().drain(..) {
            token.cancel();
        }
    }
}

/// The `com.endlessm.AppManager` root object.
pub struct Root {
    shared: Arc<Shared>,
    authority: Option<AuthorityProxy<'static>>,
    connection: zbus::Connection,
}

impl Root {
    pub fn new(config: ConfigSnapshot, authority: Option<AuthorityProxy<'static>>, connection: zbus::Connection) -> Self {
        Root {
            shared: Arc::new(Shared {
                config: RwLock::new(config),
                busy: AtomicU64::new(0),
                last_activity: Mutex::new(Instant::now()),
                next_txn_id: AtomicU64::new(0),
                cancel_tokens: Mutex::new(Vec::new()),
            }),
            authority,
            connection,
        }
    }

    fn config(&self) -> ConfigSnapshot {
        self.shared.config.read().unwrap().clone()
    }

    /// Per spec §4.5: a uid/group short-circuit is tried first, so root, the
    /// dedicated service user, and admin-group members never take a polkit
    /// round trip at all. Only callers that miss the short-circuit consult
    /// the policy oracle.
    async fn authorize(&self, sender: &zbus::names::UniqueName<'_>, capability: Capability) -> Result<(), BusError> {
        if self.is_short_circuited(sender).await {
            return Ok(());
        }
        let Some(authority) = &self.authority else { return Ok(()) };
        auth::check(authority, sender.as_str(), capability).await.map_err(|e| e.tag().into_bus_error(e.to_string()))
    }

    async fn is_short_circuited(&self, sender: &zbus::names::UniqueName<'_>) -> bool {
        match auth::peer_uid(&self.connection, sender.as_str()).await {
            Ok(uid) => auth::is_privileged(uid),
            Err(e) => {
                warn!("could not resolve uid for {sender}, falling back to polkit: {e}");
                false
            }
        }
    }

    async fn allocate_txn_object(
        &self,
        server: &zbus::ObjectServer,
        kind: Kind,
        app: AppId,
        sender: &zbus::names::UniqueName<'_>,
    ) -> Result<zbus::zvariant::OwnedObjectPath, BusError> {
        let id = self.shared.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let path = format!("{TRANSACTIONS_PATH}/{id}");
        let object_path = zbus::zvariant::OwnedObjectPath::try_from(path.clone()).map_err(|_| Tag::Failed.into_bus_error("bad object path"))?;

        let cancel = Token::new();
        let shared = self.shared.clone();
        shared.busy.fetch_add(1, Ordering::SeqCst);
        shared.register_cancel(id, cancel.clone());
        let on_terminal = {
            let shared = shared.clone();
            move || {
                shared.busy.fetch_sub(1, Ordering::SeqCst);
                shared.unregister_cancel(id);
                shared.touch();
            }
        };

        let handle = RemoteTxn::new(kind, app, self.config(), cancel, on_terminal);
        server
            .at(object_path.as_ref(), handle)
            .await
            .map_err(|e| Tag::Unimplemented.into_bus_error(format!("internal transaction error: {e}")))?;

        let abort = crate::remote_txn::spawn_peer_watch(self.connection.clone(), sender.as_str().to_owned(), object_path.clone());
        if let Ok(iface_ref) = server.interface::<_, RemoteTxn>(object_path.as_ref()).await {
            iface_ref.get().await.set_watch_abort(abort);
        }

        Ok(object_path)
    }
}

#[zbus::interface(name = "com.endlessm.AppManager")]
impl Root {
    async fn install(
        &self,
        appid: String,
        #[zbus(object_server)] server: &zbus::ObjectServer,
        #[zbus(header)] header: zbus::message::Header<'_>,
    ) -> Result<zbus::zvariant::OwnedObjectPath, BusError> {
        self.shared.touch();
        let Some(sender) = header.sender() else { return Err(Tag::Failed.into_bus_error("anonymous caller")) };
        self.authorize(sender, Capability::Install).await?;

        let app: AppId = appid.parse().map_err(|_| Tag::ProtocolError.into_bus_error(format!("{appid:?} is not a legal application id")))?;
        self.allocate_txn_object(server, Kind::Install, app, sender).await
    }

    async fn update(
        &self,
        appid: String,
        #[zbus(object_server)] server: &zbus::ObjectServer,
        #[zbus(header)] header: zbus::message::Header<'_>,
    ) -> Result<zbus::zvariant::OwnedObjectPath, BusError> {
        self.shared.touch();
        let Some(sender) = header.sender() else { return Err(Tag::Failed.into_bus_error("anonymous caller")) };
        self.authorize(sender, Capability::Update).await?;

        let app: AppId = appid.parse().map_err(|_| Tag::ProtocolError.into_bus_error(format!("{appid:?} is not a legal application id")))?;
        self.allocate_txn_object(server, Kind::Update, app, sender).await
    }

    async fn uninstall(&self, appid: String, #[zbus(header)] header: zbus::message::Header<'_>) -> Result<bool, BusError> {
        self.shared.touch();
        let Some(sender) = header.sender() else { return Err(Tag::Failed.into_bus_error("anonymous caller")) };
        self.authorize(sender, Capability::Uninstall).await?;

        let app: AppId = appid.parse().map_err(|_| Tag::ProtocolError.into_bus_error(format!("{appid:?} is not a legal application id")))?;
        let config = self.config();
        let Some(prefix) = resolve_installed_prefix(&config, &app) else {
            warn!("[{tag}] uninstall requested for {app}, which has no symlink-farm entry - treating as a no-op", tag = Tag::UnknownPackage);
            return Ok(true);
        };

        let txn = Transaction::Uninstall(Uninstall { app, prefix, force: false });
        let id = self.shared.next_txn_id.fetch_add(1, Ordering::SeqCst);
        self.shared.busy.fetch_add(1, Ordering::SeqCst);
        let cancel = Token::new();
        self.shared.register_cancel(id, cancel.clone());
        let result = txn.run(&config, &cancel).await;
        self.shared.unregister_cancel(id);
        self.shared.busy.fetch_sub(1, Ordering::SeqCst);
        self.shared.touch();

        match result {
            Ok(()) => Ok(true),
            Err(e) => Err(e.tag().into_bus_error(e.to_string())),
        }
    }

    async fn get_user_capabilities(&self, #[zbus(header)] header: zbus::message::Header<'_>) -> Result<HashMap<String, Value<'static>>, BusError> {
        self.shared.touch();
        let Some(sender) = header.sender() else { return Err(Tag::Failed.into_bus_error("anonymous caller")) };

        let (can_install, can_uninstall) = if self.is_short_circuited(sender).await {
            (true, true)
        } else {
            match &self.authority {
                None => (true, true),
                Some(authority) => {
                    let can_install = auth::advertise(authority, sender.as_str(), Capability::Install).await.map_err(|e| e.tag().into_bus_error(e.to_string()))?;
                    let can_uninstall = auth::advertise(authority, sender.as_str(), Capability::Uninstall).await.map_err(|e| e.tag().into_bus_error(e.to_string()))?;
                    (can_install, can_uninstall)
                }
            }
        };

        let mut map = HashMap::new();
        map.insert("CanInstall".to_string(), Value::from(can_install));
        map.insert("CanUninstall".to_string(), Value::from(can_uninstall));
        Ok(map)
    }
}

/// Resolve the `applications_dir/<app_id>` symlink and return its parent, the
/// storage prefix the app actually lives under. `None` if the symlink is
/// absent, i.e. the app isn't installed at all.
pub fn resolve_installed_prefix(config: &ConfigSnapshot, app: &AppId) -> Option<std::path::PathBuf> {
    let link = config.applications_dir.join(app.as_str());
    let target = std::fs::read_link(&link).ok()?;
    target.parent().map(Path::to_path_buf)
}

/// Run the daemon until an idle timeout, a lost bus name, or a shutdown
/// signal ends it.
pub async fn run(config: ConfigSnapshot) -> Result<(), Error> {
    let connection = zbus::connection::Builder::system()
        .map_err(Error::Connect)?
        .build()
        .await
        .map_err(Error::Connect)?;

    let authority = match AuthorityProxy::new(&connection).await {
        Ok(proxy) => Some(proxy),
        Err(e) => {
            warn!("polkit is unavailable, falling back to uid/group short-circuit only: {e}");
            None
        }
    };

    let inactivity_timeout = config.inactivity_timeout;
    let root = Root::new(config, authority, connection.clone());
    let shared = root.shared.clone();

    connection.object_server().at(ROOT_PATH, root).await.map_err(Error::Serve)?;
    connection.request_name(BUS_NAME).await.map_err(Error::RequestName)?;
    info!("{BUS_NAME} acquired on the system bus at {ROOT_PATH}");

    let mut idle_timer = tokio::time::interval(IDLE_TICK);
    idle_timer.tick().await;

    loop {
        tokio::select! {
            _ = idle_timer.tick() => {
                if shared.busy.load(Ordering::SeqCst) == 0 && shared.idle_for() >= inactivity_timeout {
                    info!("idle for {:?}, shutting down", shared.idle_for());
                    break;
                }
            }
            result = crate::signal::shutdown_requested() => {
                result.map_err(Error::Signal)?;
                info!("shutdown signal received");
                break;
            }
            else => break,
        }
    }

    shared.cancel_all();
    let _ = connection.release_name(BUS_NAME).await;
    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not connect to the system bus")]
    Connect(#[source] zbus::Error),
    #[error("could not register the root object")]
    Serve(#[source] zbus::Error),
    #[error("could not claim {BUS_NAME}")]
    RequestName(#[source] zbus::Error),
    #[error("signal handling")]
    Signal(#[source] crate::signal::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_installed_prefix_reads_the_symlink_parent() {
        let root = tempfile::tempdir().unwrap();
        let applications_dir = root.path().join("applications");
        std::fs::create_dir_all(&applications_dir).unwrap();
        let prefix = root.path().join("storage");
        std::fs::create_dir_all(prefix.join("com.example.App")).unwrap();
        std::os::unix::fs::symlink(prefix.join("com.example.App"), applications_dir.join("com.example.App")).unwrap();

        let mut config = ConfigSnapshot::default();
        config.applications_dir = applications_dir;

        let app: AppId = "com.example.App".parse().unwrap();
        assert_eq!(resolve_installed_prefix(&config, &app), Some(prefix));
    }

    #[test]
    fn resolve_installed_prefix_is_none_without_a_symlink() {
        let root = tempfile::tempdir().unwrap();
        let applications_dir = root.path().join("applications");
        std::fs::create_dir_all(&applications_dir).unwrap();

        let mut config = ConfigSnapshot::default();
        config.applications_dir = applications_dir;

        let app: AppId = "com.example.App".parse().unwrap();
        assert_eq!(resolve_installed_prefix(&config, &app), None);
    }
}
