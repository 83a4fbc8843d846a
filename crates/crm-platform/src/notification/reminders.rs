//! Follow-up reminders
//!
//! A periodic scan flags clients left `en_attente` for too long and devis
//! awaiting an answer. Each advisory carries a dedup key so a scan that runs
//! again does not repeat it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::entity::{Notification, NotificationCategory, NotificationKind};
use super::service::{Delivery, NotificationService};
use crate::billing::{compute_total, round_cents, DevisStatus};
use crate::client::entity::{Client, ClientStatus};
use crate::client::repository::ClientRepository;
use crate::devis::entity::Devis;
use crate::devis::repository::DevisRepository;
use crate::shared::error::Result;
use crate::user::repository::UserRepository;

/// Keyed on the status date, like devis: a client put back `en_attente`
/// later is reminded again.
pub fn client_reminder_key(client: &Client) -> String {
    format!("client-pending:{}:{}", client.id, client.status_since().timestamp())
}

/// Keyed on the status date: a devis put back `en_attente` later is reminded again.
pub fn devis_reminder_key(devis: &Devis) -> String {
    format!("devis-pending:{}:{}", devis.id, devis.status_changed_at.timestamp())
}

/// Advisories due at `now` for one account.
pub fn collect_reminders(
    now: DateTime<Utc>,
    stale_days: i64,
    clients: &[Client],
    devis: &[Devis],
) -> Vec<Notification> {
    let cutoff = now - chrono::Duration::days(stale_days);
    let names: HashMap<&str, &str> = clients.iter().map(|c| (c.id.as_str(), c.name.as_str())).collect();
    let mut reminders = Vec::new();

    for client in clients {
        // Due only once strictly older than the cutoff
        if client.status != ClientStatus::EnAttente || client.status_since() >= cutoff {
            continue;
        }
        let days = (now - client.status_since()).num_days();
        reminders.push(
            Notification::new(
                &client.user_id,
                NotificationKind::Warning,
                NotificationCategory::Client,
                "Client à relancer",
                format!("{} est en attente depuis {} jours", client.name, days),
            )
            .with_client(&client.id)
            .with_dedup_key(client_reminder_key(client))
            .at(now),
        );
    }

    for d in devis {
        if d.status != DevisStatus::EnAttente {
            continue;
        }
        let client_name = names
            .get(d.client_id.as_str())
            .copied()
            .unwrap_or(d.client.client_name.as_str());
        let total = round_cents(compute_total(&d.line_items));
        reminders.push(
            Notification::new(
                &d.user_id,
                NotificationKind::Info,
                NotificationCategory::Devis,
                "Devis en attente de réponse",
                format!("« {} » pour {} ({} € TTC) attend une réponse", d.title, client_name, total),
            )
            .with_details(format!("Total TTC : {} €", total))
            .with_devis(&d.id)
            .with_client(&d.client_id)
            .with_dedup_key(devis_reminder_key(d))
            .at(now),
        );
    }

    reminders
}

/// Periodic reminder scan over every account
pub struct ReminderScanner {
    user_repo: Arc<UserRepository>,
    client_repo: Arc<ClientRepository>,
    devis_repo: Arc<DevisRepository>,
    notifications: Arc<NotificationService>,
    interval: Duration,
    stale_days: i64,
}

impl ReminderScanner {
    pub fn new(
        user_repo: Arc<UserRepository>,
        client_repo: Arc<ClientRepository>,
        devis_repo: Arc<DevisRepository>,
        notifications: Arc<NotificationService>,
        interval: Duration,
        stale_days: i64,
    ) -> Self {
        Self {
            user_repo,
            client_repo,
            devis_repo,
            notifications,
            interval,
            stale_days,
        }
    }

    /// Scan one account. Returns how many advisories were actually sent.
    pub async fn scan_user(&self, user_id: &str, now: DateTime<Utc>) -> Result<usize> {
        let clients = self.client_repo.find_all(user_id).await?;
        let devis = self.devis_repo.find_by_status(user_id, DevisStatus::EnAttente).await?;
        Ok(deliver(&self.notifications, collect_reminders(now, self.stale_days, &clients, &devis)).await)
    }

    /// Scan every account; a failing account is logged and skipped.
    pub async fn scan_all(&self) -> Result<usize> {
        let now = Utc::now();
        let mut sent = 0;
        for user_id in self.user_repo.find_all_ids().await? {
            match self.scan_user(&user_id, now).await {
                Ok(count) => sent += count,
                Err(e) => warn!(user_id = %user_id, error = %e, "Reminder scan failed for account"),
            }
        }
        Ok(sent)
    }

    /// Run until `shutdown_tx` fires.
    pub fn spawn(self: Arc<Self>, shutdown_tx: &broadcast::Sender<()>) -> tokio::task::JoinHandle<()> {
        let mut shutdown_rx = shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);

            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        debug!("Running reminder scan");
                        match self.scan_all().await {
                            Ok(sent) if sent > 0 => info!(sent, "Reminders sent"),
                            Ok(_) => {}
                            Err(e) => warn!(error = %e, "Reminder scan failed"),
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Reminder scanner shutting down");
                        break;
                    }
                }
            }
        })
    }
}

async fn deliver(notifications: &NotificationService, reminders: Vec<Notification>) -> usize {
    let mut sent = 0;
    for reminder in reminders {
        if let Delivery::Sent { .. } = notifications.notify(reminder).await {
            sent += 1;
        }
    }
    sent
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::LineItem;
    use crate::client::entity::{ClientFields, ClientSource};
    use crate::notification::hub::NotificationHub;
    use crate::notification::service::tests::MemoryStore;
    use chrono::Duration as ChronoDuration;
    use rust_decimal_macros::dec;

    fn client(status: ClientStatus, idle_days: i64, now: DateTime<Utc>) -> Client {
        let mut c = Client::new(
            "u1",
            ClientFields::new("Jean Dupont", "jean@dupont.fr", "0612345678"),
            ClientSource::Manual,
        );
        c.status = status;
        c.status_changed_at = Some(now - ChronoDuration::days(idle_days));
        c
    }

    fn pending_devis(client: &Client) -> Devis {
        let mut d = Devis::new("u1", &client.id, "Cuisine");
        d.set_line_items(vec![LineItem::new("Pose", dec!(100), 2, 20)]);
        d.set_status(DevisStatus::EnAttente);
        d
    }

    #[test]
    fn test_stale_client_and_pending_devis_give_two_advisories() {
        let now = Utc::now();
        let c = client(ClientStatus::EnAttente, 10, now);
        let d = pending_devis(&c);

        let reminders = collect_reminders(now, 7, std::slice::from_ref(&c), std::slice::from_ref(&d));
        assert_eq!(reminders.len(), 2);

        let (client_reminder, devis_reminder) = (&reminders[0], &reminders[1]);
        assert_ne!(client_reminder.dedup_key, devis_reminder.dedup_key);
        assert!(client_reminder.message.contains("Jean Dupont"));
        assert!(devis_reminder.message.contains("Jean Dupont"));
        assert!(devis_reminder.message.contains("240.00"));
        assert!(client_reminder
            .dedup_key
            .as_deref()
            .unwrap()
            .starts_with(&format!("client-pending:{}:", c.id)));
        assert!(devis_reminder
            .dedup_key
            .as_deref()
            .unwrap()
            .starts_with(&format!("devis-pending:{}:", d.id)));
    }

    #[test]
    fn test_recent_or_other_status_clients_skipped() {
        let now = Utc::now();
        let clients = vec![
            client(ClientStatus::EnAttente, 2, now),
            client(ClientStatus::Active, 30, now),
            client(ClientStatus::Nouveau, 30, now),
        ];
        assert!(collect_reminders(now, 7, &clients, &[]).is_empty());
    }

    #[test]
    fn test_client_due_only_after_the_full_period() {
        let now = Utc::now();
        let mut c = client(ClientStatus::EnAttente, 7, now);
        assert!(collect_reminders(now, 7, std::slice::from_ref(&c), &[]).is_empty());

        c.status_changed_at = Some(now - ChronoDuration::days(7) - ChronoDuration::seconds(1));
        assert_eq!(collect_reminders(now, 7, std::slice::from_ref(&c), &[]).len(), 1);
    }

    #[test]
    fn test_unrelated_edit_does_not_reset_the_clock() {
        let now = Utc::now();
        let mut c = client(ClientStatus::EnAttente, 10, now);
        c.apply(ClientFields::new("Jean Dupont", "jean@dupont.fr", "0700000000"));
        assert_eq!(collect_reminders(now, 7, std::slice::from_ref(&c), &[]).len(), 1);
    }

    #[test]
    fn test_client_back_in_attente_gets_a_new_key() {
        let now = Utc::now();
        let mut c = client(ClientStatus::EnAttente, 10, now);
        let first = client_reminder_key(&c);

        c.status_changed_at = Some(now - ChronoDuration::days(8));
        assert_ne!(client_reminder_key(&c), first);
    }

    #[test]
    fn test_devis_falls_back_to_snapshot_name() {
        let now = Utc::now();
        let c = client(ClientStatus::Active, 0, now);
        let mut d = pending_devis(&c);
        d.client.client_name = "Ancien Nom".into();

        let reminders = collect_reminders(now, 7, &[], std::slice::from_ref(&d));
        assert_eq!(reminders.len(), 1);
        assert!(reminders[0].message.contains("Ancien Nom"));
    }

    #[tokio::test]
    async fn test_repeated_scan_is_suppressed() {
        let store = Arc::new(MemoryStore::default());
        let service = NotificationService::new(store.clone(), Arc::new(NotificationHub::default()));
        let now = Utc::now();
        let c = client(ClientStatus::EnAttente, 10, now);
        let d = pending_devis(&c);

        let first = collect_reminders(now, 7, std::slice::from_ref(&c), std::slice::from_ref(&d));
        assert_eq!(deliver(&service, first).await, 2);

        let later = now + ChronoDuration::hours(1);
        let second = collect_reminders(later, 7, std::slice::from_ref(&c), std::slice::from_ref(&d));
        assert_eq!(deliver(&service, second).await, 0);
        assert_eq!(store.entries.lock().unwrap().len(), 2);
    }
}
