//! Use Case Tests
//!
//! Devis and invoice use cases run against in-memory stores, checking what
//! ends up persisted as well as what is returned.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal_macros::dec;
use serde_json::json;

use crm_platform::devis::ChangeDevisStatusUseCase;
use crm_platform::invoice::entity::parse_invoice_sequence;
use crm_platform::invoice::repository::DUPLICATE_NUMBER_MESSAGE;
use crm_platform::invoice::{ChangeInvoiceStatusUseCase, CreateInvoiceUseCase, InvoiceCommand};
use crm_platform::client::ClientFields;
use crm_platform::{
    Client, ClientSource, ClientStore, Devis, DevisStatus, DevisStore, ExecutionContext, Invoice,
    InvoiceStore, LineItem, Notification, NotificationHub, NotificationService,
    NotificationStore, PlatformError, Result, UseCaseError, User, UserStore,
};

#[derive(Default)]
struct MemoryDevis {
    rows: Mutex<Vec<Devis>>,
    writes: Mutex<usize>,
}

impl MemoryDevis {
    fn with(rows: Vec<Devis>) -> Arc<Self> {
        Arc::new(Self {
            rows: Mutex::new(rows),
            writes: Mutex::new(0),
        })
    }

    fn stored(&self, id: &str) -> Devis {
        self.rows.lock().unwrap().iter().find(|d| d.id == id).cloned().unwrap()
    }
}

#[async_trait]
impl DevisStore for MemoryDevis {
    async fn insert(&self, devis: &Devis) -> Result<()> {
        *self.writes.lock().unwrap() += 1;
        self.rows.lock().unwrap().push(devis.clone());
        Ok(())
    }

    async fn find_by_id(&self, user_id: &str, id: &str) -> Result<Option<Devis>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.id == id && d.user_id == user_id)
            .cloned())
    }

    async fn find_by_ids(&self, user_id: &str, ids: &[String]) -> Result<Vec<Devis>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.user_id == user_id && ids.contains(&d.id))
            .cloned()
            .collect())
    }

    async fn update(&self, devis: &Devis) -> Result<()> {
        *self.writes.lock().unwrap() += 1;
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.iter_mut().find(|d| d.id == devis.id && d.user_id == devis.user_id) {
            *row = devis.clone();
        }
        Ok(())
    }
}

/// Unique numbers across accounts and a per-year counter seeded from the
/// highest stored number, like the MongoDB repository.
#[derive(Default)]
struct MemoryInvoices {
    rows: Mutex<Vec<Invoice>>,
    counters: Mutex<HashMap<i32, u64>>,
}

impl MemoryInvoices {
    fn numbers(&self) -> Vec<String> {
        self.rows.lock().unwrap().iter().map(|i| i.invoice_number.clone()).collect()
    }

    fn remove(&self, number: &str) {
        self.rows.lock().unwrap().retain(|i| i.invoice_number != number);
    }
}

#[async_trait]
impl InvoiceStore for MemoryInvoices {
    async fn insert(&self, invoice: &Invoice) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|i| i.invoice_number == invoice.invoice_number) {
            return Err(PlatformError::duplicate("invoiceNumber", DUPLICATE_NUMBER_MESSAGE));
        }
        rows.push(invoice.clone());
        Ok(())
    }

    async fn find_by_id(&self, user_id: &str, id: &str) -> Result<Option<Invoice>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.id == id && i.user_id == user_id)
            .cloned())
    }

    async fn update(&self, invoice: &Invoice) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        if rows
            .iter()
            .any(|i| i.id != invoice.id && i.invoice_number == invoice.invoice_number)
        {
            return Err(PlatformError::duplicate("invoiceNumber", DUPLICATE_NUMBER_MESSAGE));
        }
        if let Some(row) = rows.iter_mut().find(|i| i.id == invoice.id) {
            *row = invoice.clone();
        }
        Ok(())
    }

    async fn next_sequence(&self, year: i32) -> Result<u64> {
        let floor = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter_map(|i| parse_invoice_sequence(&i.invoice_number, year))
            .max()
            .unwrap_or(0);
        let mut counters = self.counters.lock().unwrap();
        let counter = counters.entry(year).or_insert(floor);
        *counter += 1;
        Ok(*counter)
    }
}

#[derive(Default)]
struct MemoryClients(Vec<Client>);

#[async_trait]
impl ClientStore for MemoryClients {
    async fn find_by_id(&self, user_id: &str, id: &str) -> Result<Option<Client>> {
        Ok(self.0.iter().find(|c| c.id == id && c.user_id == user_id).cloned())
    }
}

#[derive(Default)]
struct MemoryUsers(Vec<User>);

#[async_trait]
impl UserStore for MemoryUsers {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        Ok(self.0.iter().find(|u| u.id == id).cloned())
    }
}

#[derive(Default)]
struct Inbox(Mutex<Vec<Notification>>);

#[async_trait]
impl NotificationStore for Inbox {
    async fn insert(&self, notification: &Notification) -> Result<bool> {
        self.0.lock().unwrap().push(notification.clone());
        Ok(true)
    }
}

fn notifications(inbox: &Arc<Inbox>) -> Arc<NotificationService> {
    Arc::new(NotificationService::new(inbox.clone(), Arc::new(NotificationHub::default())))
}

fn account() -> User {
    User::new("artisan@exemple.fr", "hash", "Paul", "Martin", 14)
}

fn client_of(user: &User) -> Client {
    Client::new(
        &user.id,
        ClientFields::new("Jean Dupont", "jean@dupont.fr", "0612345678"),
        ClientSource::Manual,
    )
}

fn devis_for(client: &Client, title: &str) -> Devis {
    let mut devis = Devis::new(&client.user_id, &client.id, title);
    devis.set_line_items(vec![LineItem::new(title, dec!(100), dec!(1), dec!(20))]);
    devis
}

mod devis_status_tests {
    use super::*;

    #[tokio::test]
    async fn test_refused_transition_leaves_stored_status() {
        let user = account();
        let client = client_of(&user);
        let mut devis = devis_for(&client, "Cuisine");
        devis.set_status(DevisStatus::Fini);
        let store = MemoryDevis::with(vec![devis.clone()]);
        let inbox = Arc::new(Inbox::default());
        let use_case = ChangeDevisStatusUseCase::new(store.clone(), notifications(&inbox));

        let err = use_case
            .execute(&devis.id, "nouveau", ExecutionContext::create(&user.id))
            .await
            .into_result()
            .unwrap_err();

        assert_eq!(err.code(), "INVALID_TRANSITION");
        assert_eq!(store.stored(&devis.id).status, DevisStatus::Fini);
        assert_eq!(*store.writes.lock().unwrap(), 0);
        assert!(inbox.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_status_is_refused_before_any_read() {
        let store = MemoryDevis::with(vec![]);
        let inbox = Arc::new(Inbox::default());
        let use_case = ChangeDevisStatusUseCase::new(store.clone(), notifications(&inbox));

        let err = use_case
            .execute("missing", "archivé", ExecutionContext::create("u1"))
            .await
            .into_result()
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_STATUS");
    }

    #[tokio::test]
    async fn test_accepted_change_is_persisted_and_announced() {
        let user = account();
        let client = client_of(&user);
        let devis = devis_for(&client, "Salle de bain");
        let store = MemoryDevis::with(vec![devis.clone()]);
        let inbox = Arc::new(Inbox::default());
        let use_case = ChangeDevisStatusUseCase::new(store.clone(), notifications(&inbox));

        let updated = use_case
            .execute(&devis.id, "EN_ATTENTE", ExecutionContext::create(&user.id))
            .await
            .into_result()
            .unwrap();

        assert_eq!(updated.status, DevisStatus::EnAttente);
        assert_eq!(store.stored(&devis.id).status, DevisStatus::EnAttente);
        let inbox = inbox.0.lock().unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].devis_id.as_deref(), Some(devis.id.as_str()));
    }

    #[tokio::test]
    async fn test_advance_walks_the_cycle() {
        let user = account();
        let client = client_of(&user);
        let devis = devis_for(&client, "Toiture");
        let store = MemoryDevis::with(vec![devis.clone()]);
        let inbox = Arc::new(Inbox::default());
        let use_case = ChangeDevisStatusUseCase::new(store.clone(), notifications(&inbox));

        let mut seen = Vec::new();
        for _ in 0..4 {
            let devis = use_case
                .advance(&devis.id, ExecutionContext::create(&user.id))
                .await
                .into_result()
                .unwrap();
            seen.push(devis.status);
        }
        assert_eq!(
            seen,
            [DevisStatus::EnAttente, DevisStatus::Fini, DevisStatus::Inactif, DevisStatus::Nouveau]
        );
        assert_eq!(store.stored(&devis.id).status, DevisStatus::Nouveau);
    }

    #[tokio::test]
    async fn test_other_accounts_devis_is_not_found() {
        let user = account();
        let client = client_of(&user);
        let devis = devis_for(&client, "Cuisine");
        let store = MemoryDevis::with(vec![devis.clone()]);
        let inbox = Arc::new(Inbox::default());
        let use_case = ChangeDevisStatusUseCase::new(store.clone(), notifications(&inbox));

        let err = use_case
            .advance(&devis.id, ExecutionContext::create("someone-else"))
            .await
            .into_result()
            .unwrap_err();
        assert_eq!(err.code(), "DEVIS_NOT_FOUND");
        assert_eq!(store.stored(&devis.id).status, DevisStatus::Nouveau);
    }
}

mod invoice_create_tests {
    use super::*;

    struct Fixture {
        user: User,
        devis: Vec<Devis>,
        foreign: Devis,
        invoices: Arc<MemoryInvoices>,
        use_case: CreateInvoiceUseCase,
    }

    fn fixture() -> Fixture {
        let user = account();
        let client = client_of(&user);
        let devis = vec![devis_for(&client, "Cuisine"), devis_for(&client, "Salon")];

        let stranger = account();
        let foreign = devis_for(&client_of(&stranger), "Garage");

        let mut all = devis.clone();
        all.push(foreign.clone());
        let invoices = Arc::new(MemoryInvoices::default());
        let use_case = CreateInvoiceUseCase::new(
            invoices.clone(),
            MemoryDevis::with(all),
            Arc::new(MemoryClients(vec![client])),
            Arc::new(MemoryUsers(vec![user.clone()])),
        );
        Fixture {
            user,
            devis,
            foreign,
            invoices,
            use_case,
        }
    }

    fn command(body: serde_json::Value) -> InvoiceCommand {
        serde_json::from_value(body).unwrap()
    }

    async fn create(f: &Fixture, body: serde_json::Value) -> std::result::Result<Invoice, UseCaseError> {
        f.use_case
            .execute(command(body), ExecutionContext::create(&f.user.id))
            .await
            .into_result()
    }

    #[tokio::test]
    async fn test_foreign_devis_writes_nothing() {
        let f = fixture();
        let err = create(&f, json!({ "devisIds": [f.devis[0].id, f.foreign.id] })).await.unwrap_err();

        assert_eq!(err.code(), "DEVIS_NOT_FOUND");
        let platform = PlatformError::from(err);
        assert!(matches!(&platform, PlatformError::NotFound { field: Some(field), .. } if field == "devisIds[1]"));
        assert!(f.invoices.numbers().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_number_leaves_first_invoice_intact() {
        let f = fixture();
        let first = create(&f, json!({ "devisIds": [f.devis[0].id], "invoiceNumber": "F-001" }))
            .await
            .unwrap();

        let err = create(&f, json!({ "devisIds": [f.devis[1].id], "invoiceNumber": "F-001", "discount": 50 }))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "DUPLICATE");
        assert_eq!(PlatformError::from(err).to_api_error().error, "DUPLICATE");
        let rows = f.invoices.rows.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, first.id);
        assert_eq!(rows[0].amount, dec!(120.00));
        assert_eq!(rows[0].devis_ids, vec![f.devis[0].id.clone()]);
    }

    #[tokio::test]
    async fn test_repeated_devis_is_billed_once() {
        let f = fixture();
        let invoice = create(&f, json!({ "devisIds": [f.devis[0].id, f.devis[0].id, f.devis[1].id] }))
            .await
            .unwrap();

        assert_eq!(invoice.devis_ids.len(), 2);
        assert_eq!(invoice.line_items.len(), 2);
        assert_eq!(invoice.amount, dec!(240.00));
    }

    #[tokio::test]
    async fn test_overflowing_line_does_not_panic() {
        let f = fixture();
        let invoice = create(
            &f,
            json!({
                "clientId": f.devis[0].client_id,
                "lineItems": [
                    { "description": "Énorme", "unitPrice": "79228162514264337593543950335", "quantity": 2, "tvaRate": 20 },
                    { "description": "Pose", "unitPrice": 10, "quantity": 1, "tvaRate": 0 }
                ]
            }),
        )
        .await
        .unwrap();
        assert_eq!(invoice.amount, dec!(10.00));
    }
}

mod invoice_numbering_tests {
    use super::*;

    async fn generate(
        use_case: &CreateInvoiceUseCase,
        user: &User,
        client: &Client,
        extra: serde_json::Value,
    ) -> Invoice {
        let mut body = json!({ "clientId": client.id, "issueDate": "2024-05-02" });
        if let (Some(body), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
            body.extend(extra.clone());
        }
        use_case
            .execute(serde_json::from_value(body).unwrap(), ExecutionContext::create(&user.id))
            .await
            .into_result()
            .unwrap()
    }

    fn setup() -> (User, Client, Arc<MemoryInvoices>, CreateInvoiceUseCase) {
        let user = account();
        let client = client_of(&user);
        let invoices = Arc::new(MemoryInvoices::default());
        let use_case = CreateInvoiceUseCase::new(
            invoices.clone(),
            MemoryDevis::with(vec![]),
            Arc::new(MemoryClients(vec![client.clone()])),
            Arc::new(MemoryUsers(vec![user.clone()])),
        );
        (user, client, invoices, use_case)
    }

    #[tokio::test]
    async fn test_numbers_follow_the_issue_year() {
        let (user, client, _, use_case) = setup();
        let first = generate(&use_case, &user, &client, json!({})).await;
        let second = generate(&use_case, &user, &client, json!({})).await;
        assert_eq!(first.invoice_number, "FAC-2024-001");
        assert_eq!(second.invoice_number, "FAC-2024-002");

        let next_year = generate(&use_case, &user, &client, json!({ "issueDate": "2025-01-03" })).await;
        assert_eq!(next_year.invoice_number, "FAC-2025-001");
    }

    #[tokio::test]
    async fn test_deleted_invoice_number_is_not_reused() {
        let (user, client, invoices, use_case) = setup();
        for _ in 0..3 {
            generate(&use_case, &user, &client, json!({})).await;
        }
        invoices.remove("FAC-2024-002");

        let next = generate(&use_case, &user, &client, json!({})).await;
        assert_eq!(next.invoice_number, "FAC-2024-004");
        assert_eq!(invoices.numbers().len(), 3);
    }

    #[tokio::test]
    async fn test_hand_typed_number_is_skipped() {
        let (user, client, invoices, use_case) = setup();
        generate(&use_case, &user, &client, json!({})).await;
        generate(&use_case, &user, &client, json!({ "invoiceNumber": "FAC-2024-002" })).await;

        let next = generate(&use_case, &user, &client, json!({})).await;
        assert_eq!(next.invoice_number, "FAC-2024-003");
        assert_eq!(invoices.numbers(), ["FAC-2024-001", "FAC-2024-002", "FAC-2024-003"]);
    }

    #[tokio::test]
    async fn test_counter_seeds_from_existing_numbers() {
        let (user, client, invoices, use_case) = setup();
        let legacy = Invoice::new(&user.id, &client.id, "FAC-2024-041");
        invoices.rows.lock().unwrap().push(legacy);

        let next = generate(&use_case, &user, &client, json!({})).await;
        assert_eq!(next.invoice_number, "FAC-2024-042");
    }

    #[tokio::test]
    async fn test_invoice_advance_follows_the_cycle() {
        let (user, client, invoices, use_case) = setup();
        let invoice = generate(&use_case, &user, &client, json!({})).await;
        let inbox = Arc::new(Inbox::default());
        let change = ChangeInvoiceStatusUseCase::new(invoices.clone(), notifications(&inbox));

        let mut seen = Vec::new();
        for _ in 0..5 {
            let invoice = change
                .advance(&invoice.id, ExecutionContext::create(&user.id))
                .await
                .into_result()
                .unwrap();
            seen.push(invoice.status.to_string());
        }
        assert_eq!(seen, ["pending", "paid", "overdue", "canceled", "draft"]);
        assert_eq!(inbox.0.lock().unwrap().len(), 5);
    }
}
