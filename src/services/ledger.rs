use chrono::{DateTime, Days, NaiveTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::LedgerError;
use crate::models::{Account, Client, ClientStatus, Credits, PanelSettings, Role};
use crate::services::store::JsonStore;

const USERS: &str = "users";
const RESELLERS: &str = "resellers";
const CLIENTS: &str = "clients";
const SETTINGS: &str = "settings";

lazy_static! {
    static ref CREDENTIAL_RE: Regex = Regex::new(r"^[A-Za-z0-9_-]+$").unwrap();
}

/// Which persisted collection an account lives in. Root-tier admin accounts
/// and resellers share the identifier namespace but not the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ns {
    Users,
    Resellers,
}

#[derive(Debug, Default)]
struct LedgerState {
    users: HashMap<String, Account>,
    resellers: HashMap<String, Account>,
    clients: HashMap<String, Client>,
    settings: PanelSettings,
}

impl LedgerState {
    fn account(&self, identifier: &str) -> Option<(&Account, Ns)> {
        if let Some(account) = self.users.get(identifier) {
            return Some((account, Ns::Users));
        }
        self.resellers
            .get(identifier)
            .map(|account| (account, Ns::Resellers))
    }

    fn account_mut(&mut self, identifier: &str) -> Option<(&mut Account, Ns)> {
        if self.users.contains_key(identifier) {
            return self
                .users
                .get_mut(identifier)
                .map(|account| (account, Ns::Users));
        }
        self.resellers
            .get_mut(identifier)
            .map(|account| (account, Ns::Resellers))
    }

    fn actor_role(&self, actor: &str) -> Result<Role, LedgerError> {
        self.account(actor)
            .map(|(account, _)| account.role)
            .ok_or(LedgerError::Forbidden)
    }
}

/// Authenticated panel identity, handed back to the web layer.
#[derive(Debug, Clone)]
pub struct Session {
    pub username: String,
    pub role: Role,
    pub credits: Credits,
}

/// Dashboard counters, scoped by the actor's visibility.
#[derive(Debug, Clone, Copy)]
pub struct DashboardCounts {
    pub clients: usize,
    pub resellers: usize,
    pub credits: Credits,
}

fn check_credential(field: &str, value: &str) -> Result<(), LedgerError> {
    if value.is_empty() {
        return Err(LedgerError::InvalidInput(format!(
            "{field} não pode ser vazio"
        )));
    }
    if !CREDENTIAL_RE.is_match(value) {
        return Err(LedgerError::InvalidInput(format!(
            "{field} deve conter apenas letras, números, _ ou -"
        )));
    }
    Ok(())
}

/// Hierarchical account and credit ledger. Owns the admin/reseller/client
/// collections and the panel settings; every operation runs under one lock
/// so composite mutations (debit + membership append + snapshot) never
/// interleave. Snapshots are written before the lock is released.
pub struct Ledger {
    state: Mutex<LedgerState>,
    store: JsonStore,
}

impl Ledger {
    /// Load the persisted collections and seed the root admin if the admin
    /// collection is empty.
    pub async fn load(store: JsonStore, admin_user: &str, admin_password: &str) -> Self {
        let mut state = LedgerState {
            users: store.load(USERS).await,
            resellers: store.load(RESELLERS).await,
            clients: store.load(CLIENTS).await,
            settings: store.load(SETTINGS).await,
        };

        if state.users.is_empty() {
            state.users.insert(
                admin_user.to_string(),
                Account {
                    password: admin_password.to_string(),
                    role: Role::Admin,
                    credits: Credits::Unlimited,
                    email: String::new(),
                    owned_clients: Vec::new(),
                    sub_resellers: Vec::new(),
                    created_by: None,
                },
            );
            tracing::info!("bootstrapped admin account '{admin_user}'");
        }

        Self {
            state: Mutex::new(state),
            store,
        }
    }

    async fn persist_users(&self, state: &LedgerState) -> Result<(), LedgerError> {
        self.store
            .save(USERS, &state.users)
            .await
            .map_err(LedgerError::Storage)
    }

    async fn persist_resellers(&self, state: &LedgerState) -> Result<(), LedgerError> {
        self.store
            .save(RESELLERS, &state.resellers)
            .await
            .map_err(LedgerError::Storage)
    }

    async fn persist_clients(&self, state: &LedgerState) -> Result<(), LedgerError> {
        self.store
            .save(CLIENTS, &state.clients)
            .await
            .map_err(LedgerError::Storage)
    }

    async fn persist_settings(&self, state: &LedgerState) -> Result<(), LedgerError> {
        self.store
            .save(SETTINGS, &state.settings)
            .await
            .map_err(LedgerError::Storage)
    }

    async fn persist_ns(&self, ns: Ns, state: &LedgerState) -> Result<(), LedgerError> {
        match ns {
            Ns::Users => self.persist_users(state).await,
            Ns::Resellers => self.persist_resellers(state).await,
        }
    }

    /// Panel login: the admin collection is checked first, then resellers,
    /// exact match on both fields. Maintenance mode refuses everyone but
    /// admins.
    pub async fn authenticate(
        &self,
        identifier: &str,
        credential: &str,
    ) -> Result<Session, LedgerError> {
        let state = self.state.lock().await;
        let account = state
            .users
            .get(identifier)
            .filter(|a| a.password == credential)
            .or_else(|| {
                state
                    .resellers
                    .get(identifier)
                    .filter(|a| a.password == credential)
            })
            .ok_or(LedgerError::InvalidCredentials)?;

        if state.settings.maintenance_mode && account.role != Role::Admin {
            return Err(LedgerError::Maintenance);
        }

        Ok(Session {
            username: identifier.to_string(),
            role: account.role,
            credits: account.credits,
        })
    }

    pub async fn create_client(
        &self,
        actor: &str,
        name: &str,
        password: &str,
        connections: u32,
        months: u32,
    ) -> Result<String, LedgerError> {
        self.create_client_at(actor, name, password, connections, months, Utc::now())
            .await
    }

    /// Create a client, debiting `connections + months + 1` credits from the
    /// actor. The whole mutation (client record, owner membership, balance,
    /// snapshots) is one critical section.
    pub async fn create_client_at(
        &self,
        actor: &str,
        name: &str,
        password: &str,
        connections: u32,
        months: u32,
        now: DateTime<Utc>,
    ) -> Result<String, LedgerError> {
        check_credential("nome", name)?;
        check_credential("senha", password)?;
        if connections < 1 {
            return Err(LedgerError::InvalidInput(
                "conexões deve ser pelo menos 1".to_string(),
            ));
        }
        if months < 1 {
            return Err(LedgerError::InvalidInput(
                "meses deve ser pelo menos 1".to_string(),
            ));
        }

        let mut state = self.state.lock().await;
        if state.clients.values().any(|c| c.name == name) {
            return Err(LedgerError::DuplicateIdentifier);
        }

        let (account, _) = state.account(actor).ok_or(LedgerError::Forbidden)?;
        let actor_role = account.role;
        let cost = connections.saturating_add(months).saturating_add(1);
        if !account.credits.covers(cost) {
            return Err(LedgerError::InsufficientCredit);
        }

        let expiry_date = now
            .date_naive()
            .checked_add_days(Days::new(30 * months as u64))
            .ok_or_else(|| LedgerError::InvalidInput("meses fora do intervalo".to_string()))?;
        let status = if now.naive_utc() < expiry_date.and_time(NaiveTime::MIN) {
            ClientStatus::Active
        } else {
            ClientStatus::Expired
        };

        let client_id = Uuid::new_v4().to_string();
        state.clients.insert(
            client_id.clone(),
            Client {
                name: name.to_string(),
                password: password.to_string(),
                connections,
                expiry_date,
                status,
                owner: actor.to_string(),
            },
        );

        let ns = {
            let (account, ns) = state.account_mut(actor).ok_or(LedgerError::Forbidden)?;
            if actor_role != Role::Admin {
                account.owned_clients.push(client_id.clone());
            }
            account.credits = account.credits.debit(cost);
            ns
        };

        self.persist_clients(&state).await?;
        self.persist_ns(ns, &state).await?;
        tracing::info!(owner = actor, client = name, cost, "client created");
        Ok(client_id)
    }

    /// Create a reseller (or, admin-granted, another root admin). Cost is
    /// `initial_credits + 1`; franchise resellers get an unlimited balance.
    pub async fn create_reseller(
        &self,
        actor: &str,
        name: &str,
        password: &str,
        initial_credits: u32,
        role: Role,
    ) -> Result<(), LedgerError> {
        check_credential("nome", name)?;
        check_credential("senha", password)?;

        let mut state = self.state.lock().await;
        let (account, _) = state.account(actor).ok_or(LedgerError::Forbidden)?;
        let actor_role = account.role;
        let actor_credits = account.credits;

        // Simple resellers cannot create sub-resellers; only the root admin
        // may grant admin or franchise.
        if actor_role == Role::Simple {
            return Err(LedgerError::Forbidden);
        }
        if matches!(role, Role::Admin | Role::Franchise) && actor_role != Role::Admin {
            return Err(LedgerError::Forbidden);
        }
        if state.users.contains_key(name) || state.resellers.contains_key(name) {
            return Err(LedgerError::DuplicateIdentifier);
        }

        if role == Role::Admin {
            state.users.insert(
                name.to_string(),
                Account {
                    password: password.to_string(),
                    role: Role::Admin,
                    credits: Credits::Unlimited,
                    email: String::new(),
                    owned_clients: Vec::new(),
                    sub_resellers: Vec::new(),
                    created_by: Some(actor.to_string()),
                },
            );
            self.persist_users(&state).await?;
            tracing::info!(creator = actor, account = name, "admin account created");
            return Ok(());
        }

        let cost = initial_credits.saturating_add(1);
        if !actor_credits.covers(cost) {
            return Err(LedgerError::InsufficientCredit);
        }

        let credits = if role == Role::Franchise {
            Credits::Unlimited
        } else {
            Credits::Limited(initial_credits)
        };
        state.resellers.insert(
            name.to_string(),
            Account {
                password: password.to_string(),
                role,
                credits,
                email: String::new(),
                owned_clients: Vec::new(),
                sub_resellers: Vec::new(),
                created_by: Some(actor.to_string()),
            },
        );

        let ns = {
            let (account, ns) = state.account_mut(actor).ok_or(LedgerError::Forbidden)?;
            account.sub_resellers.push(name.to_string());
            account.credits = account.credits.debit(cost);
            ns
        };

        self.persist_resellers(&state).await?;
        if ns == Ns::Users {
            self.persist_users(&state).await?;
        }
        tracing::info!(creator = actor, reseller = name, %role, "reseller created");
        Ok(())
    }

    /// Delete a client. Non-admin actors get `Forbidden` for any client they
    /// do not own, whether or not it exists. Credits are never refunded.
    pub async fn delete_client(&self, actor: &str, client_id: &str) -> Result<(), LedgerError> {
        let mut state = self.state.lock().await;
        let actor_role = state.actor_role(actor)?;

        let owner = {
            let client = state.clients.get(client_id);
            let owned = client.map(|c| c.owner == actor).unwrap_or(false);
            if actor_role != Role::Admin && !owned {
                return Err(LedgerError::Forbidden);
            }
            client.map(|c| c.owner.clone()).ok_or(LedgerError::NotFound)?
        };

        state.clients.remove(client_id);
        let owner_ns = state.account_mut(&owner).map(|(account, ns)| {
            account.owned_clients.retain(|id| id != client_id);
            ns
        });

        self.persist_clients(&state).await?;
        if let Some(ns) = owner_ns {
            self.persist_ns(ns, &state).await?;
        }
        Ok(())
    }

    /// Delete a reseller and cascade through its whole subtree: every owned
    /// client and every sub-reseller, to arbitrary depth.
    pub async fn delete_reseller(&self, actor: &str, name: &str) -> Result<(), LedgerError> {
        let mut state = self.state.lock().await;
        let actor_role = state.actor_role(actor)?;

        let (creator, exists) = match state.resellers.get(name) {
            Some(account) => (account.created_by.clone(), true),
            None => (None, false),
        };
        let created_by_actor = exists && creator.as_deref() == Some(actor);
        if actor_role != Role::Admin && !created_by_actor {
            return Err(LedgerError::Forbidden);
        }
        if !exists {
            return Err(LedgerError::NotFound);
        }

        let mut subtree = vec![name.to_string()];
        let mut i = 0;
        while i < subtree.len() {
            let current = subtree[i].clone();
            let subs = state
                .resellers
                .get(&current)
                .map(|account| account.sub_resellers.clone())
                .unwrap_or_default();
            for sub in subs {
                if !subtree.contains(&sub) {
                    subtree.push(sub);
                }
            }
            i += 1;
        }

        let mut removed_clients = 0usize;
        for reseller in &subtree {
            if let Some(account) = state.resellers.remove(reseller) {
                for client_id in &account.owned_clients {
                    if state.clients.remove(client_id).is_some() {
                        removed_clients += 1;
                    }
                }
            }
        }

        let creator_ns = creator.and_then(|creator| {
            state.account_mut(&creator).map(|(account, ns)| {
                account.sub_resellers.retain(|id| id != name);
                ns
            })
        });

        self.persist_resellers(&state).await?;
        self.persist_clients(&state).await?;
        if creator_ns == Some(Ns::Users) {
            self.persist_users(&state).await?;
        }
        tracing::info!(
            reseller = name,
            cascade = subtree.len(),
            clients = removed_clients,
            "reseller deleted"
        );
        Ok(())
    }

    /// Flip a client between active and blocked. Expired clients stay
    /// expired; re-activation means re-creating the client.
    pub async fn toggle_block(
        &self,
        actor: &str,
        client_id: &str,
    ) -> Result<ClientStatus, LedgerError> {
        let mut state = self.state.lock().await;
        let actor_role = state.actor_role(actor)?;

        let new_status = {
            let client = state.clients.get(client_id);
            let owned = client.map(|c| c.owner == actor).unwrap_or(false);
            if actor_role != Role::Admin && !owned {
                return Err(LedgerError::Forbidden);
            }
            let client = client.ok_or(LedgerError::NotFound)?;
            match client.status {
                ClientStatus::Active => ClientStatus::Blocked,
                ClientStatus::Blocked => ClientStatus::Active,
                ClientStatus::Expired => {
                    return Err(LedgerError::InvalidInput(
                        "cliente expirado não pode ser alterado".to_string(),
                    ))
                }
            }
        };

        if let Some(client) = state.clients.get_mut(client_id) {
            client.status = new_status;
        }
        self.persist_clients(&state).await?;
        Ok(new_status)
    }

    pub async fn authorize_playback(
        &self,
        name: &str,
        password: &str,
    ) -> Result<Client, LedgerError> {
        self.authorize_playback_at(name, password, Utc::now()).await
    }

    /// Playback credential check across all clients. Blocked and expired
    /// clients are denied; expiry is applied lazily here and persisted.
    pub async fn authorize_playback_at(
        &self,
        name: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<Client, LedgerError> {
        let mut state = self.state.lock().await;
        let client_id = state
            .clients
            .iter()
            .find(|(_, c)| c.name == name && c.password == password)
            .map(|(id, _)| id.clone())
            .ok_or(LedgerError::InvalidCredentials)?;

        let client = state
            .clients
            .get(&client_id)
            .cloned()
            .ok_or(LedgerError::InvalidCredentials)?;
        if client.status != ClientStatus::Active {
            return Err(LedgerError::InvalidCredentials);
        }
        if client.is_expired_at(now) {
            if let Some(c) = state.clients.get_mut(&client_id) {
                c.status = ClientStatus::Expired;
            }
            self.persist_clients(&state).await?;
            tracing::info!(client = name, "playback denied, subscription expired");
            return Err(LedgerError::Expired);
        }

        Ok(client)
    }

    /// Credential-only lookup, ignoring status and expiry. The XMLTV
    /// endpoint performs this weaker check.
    pub async fn lookup_playback(
        &self,
        name: &str,
        password: &str,
    ) -> Result<Client, LedgerError> {
        let state = self.state.lock().await;
        state
            .clients
            .values()
            .find(|c| c.name == name && c.password == password)
            .cloned()
            .ok_or(LedgerError::InvalidCredentials)
    }

    /// Clients visible to the actor: all of them for admins, directly owned
    /// otherwise.
    pub async fn list_clients(&self, actor: &str) -> Result<Vec<(String, Client)>, LedgerError> {
        let state = self.state.lock().await;
        let role = state.actor_role(actor)?;
        let mut clients: Vec<(String, Client)> = state
            .clients
            .iter()
            .filter(|(_, c)| role == Role::Admin || c.owner == actor)
            .map(|(id, c)| (id.clone(), c.clone()))
            .collect();
        clients.sort_by(|a, b| a.1.name.cmp(&b.1.name));
        Ok(clients)
    }

    /// Resellers visible to the actor: all for admins, directly created
    /// otherwise. Sub-reseller chains do not grant visibility into
    /// grand-children.
    pub async fn list_resellers(
        &self,
        actor: &str,
    ) -> Result<Vec<(String, Account)>, LedgerError> {
        let state = self.state.lock().await;
        let role = state.actor_role(actor)?;
        let mut resellers: Vec<(String, Account)> = state
            .resellers
            .iter()
            .filter(|(_, a)| role == Role::Admin || a.created_by.as_deref() == Some(actor))
            .map(|(id, a)| (id.clone(), a.clone()))
            .collect();
        resellers.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(resellers)
    }

    /// Single client fetch under the same visibility rule as `list_clients`.
    pub async fn client_for_actor(
        &self,
        actor: &str,
        client_id: &str,
    ) -> Result<Client, LedgerError> {
        let state = self.state.lock().await;
        let role = state.actor_role(actor)?;
        let client = state.clients.get(client_id);
        let owned = client.map(|c| c.owner == actor).unwrap_or(false);
        if role != Role::Admin && !owned {
            return Err(LedgerError::Forbidden);
        }
        client.cloned().ok_or(LedgerError::NotFound)
    }

    pub async fn counts(&self, actor: &str) -> Result<DashboardCounts, LedgerError> {
        let state = self.state.lock().await;
        let (account, _) = state.account(actor).ok_or(LedgerError::Forbidden)?;
        let role = account.role;
        let credits = account.credits;

        let clients = if role == Role::Admin {
            state.clients.len()
        } else {
            state.clients.values().filter(|c| c.owner == actor).count()
        };
        let resellers = match role {
            Role::Admin => state.resellers.len(),
            Role::Master | Role::Franchise => state
                .resellers
                .values()
                .filter(|r| r.created_by.as_deref() == Some(actor))
                .count(),
            Role::Simple => 0,
        };

        Ok(DashboardCounts {
            clients,
            resellers,
            credits,
        })
    }

    pub async fn profile(&self, actor: &str) -> Result<(String, Session), LedgerError> {
        let state = self.state.lock().await;
        let (account, _) = state.account(actor).ok_or(LedgerError::Forbidden)?;
        Ok((
            account.email.clone(),
            Session {
                username: actor.to_string(),
                role: account.role,
                credits: account.credits,
            },
        ))
    }

    /// Update the actor's own email and/or password.
    pub async fn update_profile(
        &self,
        actor: &str,
        email: Option<&str>,
        password: Option<&str>,
    ) -> Result<(), LedgerError> {
        if let Some(password) = password {
            check_credential("senha", password)?;
        }

        let mut state = self.state.lock().await;
        let ns = {
            let (account, ns) = state.account_mut(actor).ok_or(LedgerError::Forbidden)?;
            if let Some(email) = email {
                account.email = email.to_string();
            }
            if let Some(password) = password {
                account.password = password.to_string();
            }
            ns
        };
        self.persist_ns(ns, &state).await
    }

    pub async fn settings(&self) -> PanelSettings {
        self.state.lock().await.settings.clone()
    }

    /// Admin-only settings update; None fields are left untouched.
    pub async fn update_settings(
        &self,
        actor: &str,
        template: Option<String>,
        public_url2: Option<String>,
        public_url3: Option<String>,
    ) -> Result<PanelSettings, LedgerError> {
        let mut state = self.state.lock().await;
        if state.actor_role(actor)? != Role::Admin {
            return Err(LedgerError::Forbidden);
        }

        if let Some(template) = template {
            state.settings.client_info_template = template;
        }
        if let Some(url) = public_url2 {
            state.settings.public_url2 = url;
        }
        if let Some(url) = public_url3 {
            state.settings.public_url3 = url;
        }
        self.persist_settings(&state).await?;
        Ok(state.settings.clone())
    }

    /// Admin-only maintenance toggle; returns the new state.
    pub async fn toggle_maintenance(&self, actor: &str) -> Result<bool, LedgerError> {
        let mut state = self.state.lock().await;
        if state.actor_role(actor)? != Role::Admin {
            return Err(LedgerError::Forbidden);
        }
        state.settings.maintenance_mode = !state.settings.maintenance_mode;
        self.persist_settings(&state).await?;
        tracing::info!(
            enabled = state.settings.maintenance_mode,
            "maintenance mode toggled"
        );
        Ok(state.settings.maintenance_mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    async fn test_ledger() -> Ledger {
        let dir = std::env::temp_dir().join(format!("painel-ledger-{}", Uuid::new_v4()));
        Ledger::load(JsonStore::new(dir), "admin", "admin123").await
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn authenticate_checks_admins_then_resellers() {
        let ledger = test_ledger().await;
        let session = ledger.authenticate("admin", "admin123").await.unwrap();
        assert_eq!(session.role, Role::Admin);
        assert_eq!(session.credits, Credits::Unlimited);

        assert!(matches!(
            ledger.authenticate("admin", "wrong").await,
            Err(LedgerError::InvalidCredentials)
        ));

        ledger
            .create_reseller("admin", "loja", "segredo", 10, Role::Simple)
            .await
            .unwrap();
        let session = ledger.authenticate("loja", "segredo").await.unwrap();
        assert_eq!(session.role, Role::Simple);
        assert_eq!(session.credits, Credits::Limited(10));
    }

    #[tokio::test]
    async fn admin_creates_client_without_debit() {
        let ledger = test_ledger().await;
        let id = ledger
            .create_client_at("admin", "bob", "pass123", 2, 3, fixed_now())
            .await
            .unwrap();

        let client = ledger.client_for_actor("admin", &id).await.unwrap();
        assert_eq!(client.status, ClientStatus::Active);
        assert_eq!(client.connections, 2);
        assert_eq!(
            client.expiry_date,
            fixed_now().date_naive() + Days::new(90)
        );

        let counts = ledger.counts("admin").await.unwrap();
        assert_eq!(counts.credits, Credits::Unlimited);
        assert_eq!(counts.clients, 1);
    }

    #[tokio::test]
    async fn client_creation_debits_exact_cost() {
        let ledger = test_ledger().await;
        ledger
            .create_reseller("admin", "loja", "segredo", 10, Role::Simple)
            .await
            .unwrap();

        // cost = connections + months + 1 = 6
        ledger
            .create_client("loja", "c1", "p1", 2, 3)
            .await
            .unwrap();
        let counts = ledger.counts("loja").await.unwrap();
        assert_eq!(counts.credits, Credits::Limited(4));

        // 4 credits cannot cover another cost-6 client
        assert!(matches!(
            ledger.create_client("loja", "c2", "p2", 2, 3).await,
            Err(LedgerError::InsufficientCredit)
        ));

        // cost = 3 fits exactly once more
        ledger
            .create_client("loja", "c2", "p2", 1, 1)
            .await
            .unwrap();
        let counts = ledger.counts("loja").await.unwrap();
        assert_eq!(counts.credits, Credits::Limited(1));
    }

    #[tokio::test]
    async fn duplicate_client_name_is_rejected() {
        let ledger = test_ledger().await;
        ledger
            .create_client("admin", "bob", "p1", 1, 1)
            .await
            .unwrap();
        assert!(matches!(
            ledger.create_client("admin", "bob", "p2", 1, 1).await,
            Err(LedgerError::DuplicateIdentifier)
        ));
    }

    #[tokio::test]
    async fn invalid_characters_are_rejected_not_stripped() {
        let ledger = test_ledger().await;
        for bad in ["bob!", "bob joão", "bob@home", ""] {
            assert!(matches!(
                ledger.create_client("admin", bad, "pass", 1, 1).await,
                Err(LedgerError::InvalidInput(_))
            ));
        }
        // underscore and dash are allowed
        ledger
            .create_client("admin", "bob_2-ok", "pass-1", 1, 1)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn counts_below_one_are_rejected() {
        let ledger = test_ledger().await;
        assert!(matches!(
            ledger.create_client("admin", "a", "p", 0, 1).await,
            Err(LedgerError::InvalidInput(_))
        ));
        assert!(matches!(
            ledger.create_client("admin", "a", "p", 1, 0).await,
            Err(LedgerError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn non_owner_delete_is_forbidden_regardless_of_existence() {
        let ledger = test_ledger().await;
        ledger
            .create_reseller("admin", "a", "pa", 10, Role::Simple)
            .await
            .unwrap();
        ledger
            .create_reseller("admin", "b", "pb", 10, Role::Simple)
            .await
            .unwrap();
        let id = ledger.create_client("b", "cli", "p", 1, 1).await.unwrap();

        assert!(matches!(
            ledger.delete_client("a", &id).await,
            Err(LedgerError::Forbidden)
        ));
        assert!(matches!(
            ledger.delete_client("a", "no-such-id").await,
            Err(LedgerError::Forbidden)
        ));
        // Admins see the distinction
        assert!(matches!(
            ledger.delete_client("admin", "no-such-id").await,
            Err(LedgerError::NotFound)
        ));

        // The owner can delete, and credits are not refunded
        ledger.delete_client("b", &id).await.unwrap();
        let counts = ledger.counts("b").await.unwrap();
        assert_eq!(counts.clients, 0);
        assert_eq!(counts.credits, Credits::Limited(7));
    }

    #[tokio::test]
    async fn reseller_cascade_deletes_whole_subtree() {
        let ledger = test_ledger().await;
        ledger
            .create_reseller("admin", "r1", "p", 50, Role::Master)
            .await
            .unwrap();
        ledger.create_client("r1", "c1", "p", 1, 1).await.unwrap();
        ledger.create_client("r1", "c2", "p", 1, 1).await.unwrap();

        ledger
            .create_reseller("r1", "r2", "p", 20, Role::Master)
            .await
            .unwrap();
        ledger.create_client("r2", "c3", "p", 1, 1).await.unwrap();

        ledger
            .create_reseller("r2", "r3", "p", 5, Role::Simple)
            .await
            .unwrap();
        ledger.create_client("r3", "c4", "p", 1, 1).await.unwrap();

        ledger.delete_reseller("admin", "r1").await.unwrap();

        assert!(ledger.list_resellers("admin").await.unwrap().is_empty());
        assert!(ledger.list_clients("admin").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_reseller_requires_creator_or_admin() {
        let ledger = test_ledger().await;
        ledger
            .create_reseller("admin", "r1", "p", 20, Role::Master)
            .await
            .unwrap();
        ledger
            .create_reseller("r1", "r2", "p", 5, Role::Simple)
            .await
            .unwrap();
        ledger
            .create_reseller("admin", "other", "p", 5, Role::Master)
            .await
            .unwrap();

        // "other" did not create r2
        assert!(matches!(
            ledger.delete_reseller("other", "r2").await,
            Err(LedgerError::Forbidden)
        ));
        // r1 did
        ledger.delete_reseller("r1", "r2").await.unwrap();
        let visible = ledger.list_resellers("r1").await.unwrap();
        assert!(visible.is_empty());
    }

    #[tokio::test]
    async fn role_escalation_is_admin_only() {
        let ledger = test_ledger().await;
        ledger
            .create_reseller("admin", "m", "p", 30, Role::Master)
            .await
            .unwrap();

        assert!(matches!(
            ledger.create_reseller("m", "f", "p", 5, Role::Franchise).await,
            Err(LedgerError::Forbidden)
        ));
        assert!(matches!(
            ledger.create_reseller("m", "a", "p", 5, Role::Admin).await,
            Err(LedgerError::Forbidden)
        ));
        // master may grant simple and master
        ledger
            .create_reseller("m", "s", "p", 2, Role::Simple)
            .await
            .unwrap();

        // simple resellers cannot create resellers at all
        assert!(matches!(
            ledger.create_reseller("s", "x", "p", 0, Role::Simple).await,
            Err(LedgerError::Forbidden)
        ));

        // admin grants franchise with unlimited credits
        ledger
            .create_reseller("admin", "f", "p", 0, Role::Franchise)
            .await
            .unwrap();
        let session = ledger.authenticate("f", "p").await.unwrap();
        assert_eq!(session.credits, Credits::Unlimited);
    }

    #[tokio::test]
    async fn reseller_name_is_unique_across_namespaces() {
        let ledger = test_ledger().await;
        assert!(matches!(
            ledger
                .create_reseller("admin", "admin", "p", 0, Role::Simple)
                .await,
            Err(LedgerError::DuplicateIdentifier)
        ));

        ledger
            .create_reseller("admin", "loja", "p", 0, Role::Simple)
            .await
            .unwrap();
        assert!(matches!(
            ledger
                .create_reseller("admin", "loja", "p", 0, Role::Master)
                .await,
            Err(LedgerError::DuplicateIdentifier)
        ));
    }

    #[tokio::test]
    async fn playback_expires_lazily_and_terminally() {
        let ledger = test_ledger().await;
        let now = fixed_now();
        let id = ledger
            .create_client_at("admin", "bob", "pass", 1, 1, now)
            .await
            .unwrap();

        // Within the window
        ledger
            .authorize_playback_at("bob", "pass", now + Duration::days(29))
            .await
            .unwrap();

        // 31 days later the client expires and is persisted as such
        assert!(matches!(
            ledger
                .authorize_playback_at("bob", "pass", now + Duration::days(31))
                .await,
            Err(LedgerError::Expired)
        ));
        let client = ledger.client_for_actor("admin", &id).await.unwrap();
        assert_eq!(client.status, ClientStatus::Expired);

        // Once expired the status check denies before the expiry check
        assert!(matches!(
            ledger.authorize_playback_at("bob", "pass", now).await,
            Err(LedgerError::InvalidCredentials)
        ));

        // Expired is terminal: the block toggle refuses to touch it
        assert!(matches!(
            ledger.toggle_block("admin", &id).await,
            Err(LedgerError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn blocked_clients_are_denied_until_unblocked() {
        let ledger = test_ledger().await;
        let id = ledger
            .create_client("admin", "bob", "pass", 1, 1)
            .await
            .unwrap();

        assert_eq!(
            ledger.toggle_block("admin", &id).await.unwrap(),
            ClientStatus::Blocked
        );
        assert!(matches!(
            ledger.authorize_playback("bob", "pass").await,
            Err(LedgerError::InvalidCredentials)
        ));

        assert_eq!(
            ledger.toggle_block("admin", &id).await.unwrap(),
            ClientStatus::Active
        );
        ledger.authorize_playback("bob", "pass").await.unwrap();
    }

    #[tokio::test]
    async fn toggle_block_is_owner_scoped() {
        let ledger = test_ledger().await;
        ledger
            .create_reseller("admin", "a", "p", 10, Role::Simple)
            .await
            .unwrap();
        ledger
            .create_reseller("admin", "b", "p", 10, Role::Simple)
            .await
            .unwrap();
        let id = ledger.create_client("b", "cli", "p", 1, 1).await.unwrap();

        assert!(matches!(
            ledger.toggle_block("a", &id).await,
            Err(LedgerError::Forbidden)
        ));
        ledger.toggle_block("b", &id).await.unwrap();
    }

    #[tokio::test]
    async fn visibility_is_direct_ownership_only() {
        let ledger = test_ledger().await;
        ledger
            .create_reseller("admin", "r1", "p", 30, Role::Master)
            .await
            .unwrap();
        ledger
            .create_reseller("r1", "r2", "p", 10, Role::Simple)
            .await
            .unwrap();
        ledger.create_client("r1", "c1", "p", 1, 1).await.unwrap();
        ledger.create_client("r2", "c2", "p", 1, 1).await.unwrap();

        let r1_clients = ledger.list_clients("r1").await.unwrap();
        assert_eq!(r1_clients.len(), 1);
        assert_eq!(r1_clients[0].1.name, "c1");

        // r2 was created by r1, but r2's reseller list is its own
        let r1_resellers = ledger.list_resellers("r1").await.unwrap();
        assert_eq!(r1_resellers.len(), 1);
        assert_eq!(r1_resellers[0].0, "r2");

        // admin sees everything
        assert_eq!(ledger.list_clients("admin").await.unwrap().len(), 2);
        assert_eq!(ledger.list_resellers("admin").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn maintenance_mode_gates_non_admin_logins() {
        let ledger = test_ledger().await;
        ledger
            .create_reseller("admin", "loja", "p", 5, Role::Simple)
            .await
            .unwrap();

        assert!(ledger.toggle_maintenance("admin").await.unwrap());
        assert!(matches!(
            ledger.authenticate("loja", "p").await,
            Err(LedgerError::Maintenance)
        ));
        ledger.authenticate("admin", "admin123").await.unwrap();

        assert!(!ledger.toggle_maintenance("admin").await.unwrap());
        ledger.authenticate("loja", "p").await.unwrap();

        assert!(matches!(
            ledger.toggle_maintenance("loja").await,
            Err(LedgerError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn profile_update_validates_new_password() {
        let ledger = test_ledger().await;
        ledger
            .create_reseller("admin", "loja", "p", 5, Role::Simple)
            .await
            .unwrap();

        assert!(matches!(
            ledger.update_profile("loja", None, Some("não vale")).await,
            Err(LedgerError::InvalidInput(_))
        ));

        ledger
            .update_profile("loja", Some("a@b.com"), Some("nova_senha"))
            .await
            .unwrap();
        let (email, _) = ledger.profile("loja").await.unwrap();
        assert_eq!(email, "a@b.com");
        ledger.authenticate("loja", "nova_senha").await.unwrap();
    }

    #[tokio::test]
    async fn state_survives_reload_from_store() {
        let dir = std::env::temp_dir().join(format!("painel-ledger-{}", Uuid::new_v4()));
        let store = JsonStore::new(dir.clone());

        let ledger = Ledger::load(store.clone(), "admin", "admin123").await;
        ledger
            .create_reseller("admin", "loja", "p", 7, Role::Simple)
            .await
            .unwrap();
        ledger.create_client("loja", "cli", "p", 1, 1).await.unwrap();

        let reloaded = Ledger::load(store, "admin", "admin123").await;
        let counts = reloaded.counts("loja").await.unwrap();
        assert_eq!(counts.clients, 1);
        assert_eq!(counts.credits, Credits::Limited(4));
        reloaded.authorize_playback("cli", "p").await.unwrap();
    }
}
