//! Postgres-backed customer store implementation.
//!
//! The aggregate is spread over four tables (`customer`, `address`,
//! `communication`, `phone`, see `sql/customers.sql`). Nested collections are
//! written as a full replacement: on update every owned row is deleted and the
//! current collections are inserted again.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` on `communication_email_key` | `DuplicateEmail` | Concurrent writer claimed the email |
//! | Database (unique violation) | `23505` on `phone_number_key` | `DuplicatePhone` | Concurrent writer claimed the number |
//! | Database (unique violation) | `23505` on anything else | `Constraint` | Colliding primary key |
//! | Database (integrity violation) | Other `23xxx` | `Constraint` | Foreign key / not null / check |
//! | Database (transaction rollback) | `40001`, `40P01` | `Aborted` | Serialization failure, deadlock |
//! | Database (other) | Any other | `Backend` | Other database errors |
//! | PoolClosed / Io / decode | N/A | `Backend` | Connectivity and decoding failures |
//!
//! ## Concurrency
//!
//! Aggregates loaded through a [`PostgresCustomerTx`] are locked with
//! `SELECT … FOR UPDATE`, and the customer row is written with a version
//! compare-and-set, so a lost race surfaces as [`StoreError::Conflict`].

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::postgres::{PgConnection, PgDatabaseError, PgPool, PgRow};
use sqlx::{Postgres, QueryBuilder, Row, Transaction};
use tracing::{Span, instrument};
use uuid::Uuid;

use customerhub_core::{
    AddressId, AggregateRoot, AuditStamp, CommunicationId, CustomerId, ExpectedVersion, PhoneId,
};
use customerhub_customers::{
    Address, Communication, Customer, CustomerSnapshot, PersonData, Phone, Predicate,
};

use super::query::{Page, PageRequest};
use super::r#trait::{CustomerStore, CustomerTx, DuplicateCheck, StoreError, StoreResult};

/// Unique constraint on `communication.email`.
pub const EMAIL_CONSTRAINT: &str = "communication_email_key";
/// Unique constraint on `phone.phone_number`.
pub const PHONE_CONSTRAINT: &str = "phone_number_key";

/// Opens a consistent read-only snapshot for multi-statement reads.
const SNAPSHOT_READ: &str = "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY";

const CUSTOMER_COLUMNS: &str = "c.customer_id, c.version, c.name, c.first_name, c.date_of_birth, \
     c.created, c.created_by, c.modified, c.modified_by";

/// Postgres-backed customer store.
///
/// `PgPool` is internally reference counted, so the store is cheap to clone
/// and can be shared across tasks.
#[derive(Debug, Clone)]
pub struct PostgresCustomerStore {
    pool: PgPool,
}

impl PostgresCustomerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Transaction over [`PostgresCustomerStore`]; rolls back when dropped.
pub struct PostgresCustomerTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl DuplicateCheck for PostgresCustomerTx {
    async fn exists_by_email(&mut self, email: &str) -> StoreResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM communication WHERE email = $1)",
        )
        .bind(email)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("exists_by_email", e))
    }

    async fn exists_by_email_excluding_customer(
        &mut self,
        email: &str,
        customer_id: CustomerId,
    ) -> StoreResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM communication WHERE email = $1 AND customer_id <> $2)",
        )
        .bind(email)
        .bind(*customer_id.as_uuid())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("exists_by_email_excluding_customer", e))
    }

    async fn exists_by_phone_number(&mut self, phone_number: &str) -> StoreResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM phone WHERE phone_number = $1)",
        )
        .bind(phone_number)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("exists_by_phone_number", e))
    }

    async fn exists_by_phone_number_excluding_communications(
        &mut self,
        phone_number: &str,
        communication_ids: &[CommunicationId],
    ) -> StoreResult<bool> {
        let excluded: Vec<Uuid> = communication_ids.iter().map(|id| *id.as_uuid()).collect();
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM phone
                WHERE phone_number = $1 AND NOT (communication_id = ANY($2))
            )
            "#,
        )
        .bind(phone_number)
        .bind(excluded)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("exists_by_phone_number_excluding_communications", e))
    }
}

#[async_trait]
impl CustomerTx for PostgresCustomerTx {
    #[instrument(skip(self), fields(customer_id = %id), err)]
    async fn find_by_id(&mut self, id: CustomerId) -> StoreResult<Option<Customer>> {
        let row = sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customer c WHERE c.customer_id = $1 FOR UPDATE"
        ))
        .bind(*id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("find_by_id", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let rows = vec![decode_customer_row(&row)?];
        Ok(load_aggregates(&mut self.tx, rows).await?.pop())
    }

    #[instrument(
        skip(self, ids),
        fields(requested = ids.len(), found = tracing::field::Empty),
        err
    )]
    async fn find_all_by_id_in(&mut self, ids: &[CustomerId]) -> StoreResult<Vec<Customer>> {
        let uuids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let rows = sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customer c WHERE c.customer_id = ANY($1) \
             ORDER BY c.seq FOR UPDATE"
        ))
        .bind(uuids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("find_all_by_id_in", e))?;

        let rows = rows
            .iter()
            .map(decode_customer_row)
            .collect::<StoreResult<Vec<_>>>()?;
        let mut by_id: HashMap<CustomerId, Customer> = load_aggregates(&mut self.tx, rows)
            .await?
            .into_iter()
            .map(|c| (c.id_typed(), c))
            .collect();

        Span::current().record("found", by_id.len());
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn exists_by_id(&mut self, id: CustomerId) -> StoreResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM customer WHERE customer_id = $1)",
        )
        .bind(*id.as_uuid())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("exists_by_id", e))
    }

    #[instrument(skip(self, customer), fields(customer_id = %customer.id_typed()), err)]
    async fn insert(&mut self, customer: &Customer) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO customer (
                customer_id,
                version,
                name,
                first_name,
                date_of_birth,
                created,
                created_by,
                modified,
                modified_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(*customer.id_typed().as_uuid())
        .bind(version_to_db(customer.version()))
        .bind(customer.name())
        .bind(customer.first_name())
        .bind(customer.date_of_birth())
        .bind(customer.created().at)
        .bind(&customer.created().by)
        .bind(customer.modified().at)
        .bind(&customer.modified().by)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_customer", e))?;

        insert_children(&mut self.tx, customer).await
    }

    #[instrument(
        skip(self, customer),
        fields(customer_id = %customer.id_typed(), expected_version = %expected),
        err
    )]
    async fn update(
        &mut self,
        customer: &Customer,
        expected: ExpectedVersion,
    ) -> StoreResult<Customer> {
        let id = customer.id_typed();

        let result = sqlx::query(
            r#"
            UPDATE customer
            SET
                name = $1,
                first_name = $2,
                date_of_birth = $3,
                modified = $4,
                modified_by = $5,
                version = version + 1
            WHERE customer_id = $6 AND version = $7
            "#,
        )
        .bind(customer.name())
        .bind(customer.first_name())
        .bind(customer.date_of_birth())
        .bind(customer.modified().at)
        .bind(&customer.modified().by)
        .bind(*id.as_uuid())
        .bind(version_to_db(expected.version()))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_customer", e))?;

        if result.rows_affected() == 0 {
            let actual = sqlx::query_scalar::<_, i64>(
                "SELECT version FROM customer WHERE customer_id = $1",
            )
            .bind(*id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("read_version", e))?;

            return Err(match actual {
                Some(actual) => StoreError::Conflict {
                    id,
                    expected: expected.version(),
                    actual: version_from_db(actual)?,
                },
                None => StoreError::NotFound(id),
            });
        }

        sqlx::query("DELETE FROM address WHERE customer_id = $1")
            .bind(*id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_addresses", e))?;
        // Phones go with their communication (ON DELETE CASCADE).
        sqlx::query("DELETE FROM communication WHERE customer_id = $1")
            .bind(*id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_communications", e))?;

        insert_children(&mut self.tx, customer).await?;
        Ok(customer.clone().into_stored(expected))
    }

    #[instrument(skip(self), fields(customer_id = %id), err)]
    async fn delete(&mut self, id: CustomerId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM customer WHERE customer_id = $1")
            .bind(*id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_customer", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn commit(self) -> StoreResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}

#[async_trait]
impl CustomerStore for PostgresCustomerStore {
    type Tx = PostgresCustomerTx;

    async fn begin(&self) -> StoreResult<Self::Tx> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(PostgresCustomerTx { tx })
    }

    #[instrument(skip(self), fields(customer_id = %id), err)]
    async fn find_by_id(&self, id: CustomerId) -> StoreResult<Option<Customer>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))?;

        let row = sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customer c WHERE c.customer_id = $1"
        ))
        .bind(*id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("find_by_id", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let rows = vec![decode_customer_row(&row)?];
        Ok(load_aggregates(&mut conn, rows).await?.pop())
    }

    #[instrument(
        skip(self, predicate),
        fields(
            page_number = page.page_number(),
            page_size = page.page_size(),
            total_elements = tracing::field::Empty
        ),
        err
    )]
    async fn find_all(
        &self,
        predicate: &Predicate,
        page: &PageRequest,
    ) -> StoreResult<Page<Customer>> {
        // Count and page must observe the same snapshot.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_read", e))?;
        sqlx::query(SNAPSHOT_READ)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("begin_read", e))?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM customer c WHERE ");
        push_predicate(&mut count, predicate);
        let total: i64 = count
            .build()
            .fetch_one(&mut *tx)
            .await
            .and_then(|row| row.try_get(0))
            .map_err(|e| map_sqlx_error("count_customers", e))?;
        let total = u64::try_from(total).unwrap_or(0);

        let sort = page.sort();
        let mut select =
            QueryBuilder::<Postgres>::new(format!("SELECT {CUSTOMER_COLUMNS} FROM customer c WHERE "));
        push_predicate(&mut select, predicate);
        select
            .push(" ORDER BY ")
            .push(sort.field.column())
            .push(" ")
            .push(sort.direction.keyword())
            .push(", c.seq ASC LIMIT ")
            .push_bind(i64::from(page.page_size()))
            .push(" OFFSET ")
            .push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));

        let rows = select
            .build()
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("find_all", e))?;
        let rows = rows
            .iter()
            .map(decode_customer_row)
            .collect::<StoreResult<Vec<_>>>()?;
        let content = load_aggregates(&mut tx, rows).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("end_read", e))?;

        Span::current().record("total_elements", total);
        Ok(Page::new(content, page, total))
    }

    async fn find_one_by_id_and_names(
        &self,
        id: CustomerId,
        name: &str,
        first_name: &str,
    ) -> StoreResult<Option<Customer>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))?;

        let row = sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customer c \
             WHERE c.customer_id = $1 AND c.name = $2 AND c.first_name = $3 \
             ORDER BY c.seq LIMIT 1"
        ))
        .bind(*id.as_uuid())
        .bind(name)
        .bind(first_name)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("find_one_by_id_and_names", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let rows = vec![decode_customer_row(&row)?];
        Ok(load_aggregates(&mut conn, rows).await?.pop())
    }
}

/// Render a predicate as a boolean SQL expression over `customer c`.
///
/// Nested-collection criteria become `EXISTS` sub-selects so a customer with
/// several matching rows is returned once.
fn push_predicate(builder: &mut QueryBuilder<'_, Postgres>, predicate: &Predicate) {
    match predicate {
        Predicate::All => {
            builder.push("TRUE");
        }
        Predicate::And(parts) => push_joined(builder, parts, " AND ", "TRUE"),
        Predicate::Or(parts) => push_joined(builder, parts, " OR ", "FALSE"),
        Predicate::NameContains(needle) => {
            builder.push("LOWER(c.name) LIKE ").push_bind(like_pattern(needle));
        }
        Predicate::FirstNameContains(needle) => {
            builder.push("LOWER(c.first_name) LIKE ").push_bind(like_pattern(needle));
        }
        Predicate::AddressCityEquals(city) => {
            builder
                .push("EXISTS (SELECT 1 FROM address a WHERE a.customer_id = c.customer_id AND a.city = ")
                .push_bind(city.clone())
                .push(")");
        }
        Predicate::CommunicationEmailEquals(email) => {
            builder
                .push("EXISTS (SELECT 1 FROM communication m WHERE m.customer_id = c.customer_id AND m.email = ")
                .push_bind(email.clone())
                .push(")");
        }
        Predicate::IdIn(ids) => {
            let uuids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
            builder.push("c.customer_id = ANY(").push_bind(uuids).push(")");
        }
        Predicate::IdTextEquals(text) => {
            builder.push("c.customer_id::text = ").push_bind(text.clone());
        }
    }
}

fn push_joined(
    builder: &mut QueryBuilder<'_, Postgres>,
    parts: &[Predicate],
    separator: &str,
    empty: &str,
) {
    if parts.is_empty() {
        builder.push(empty);
        return;
    }
    builder.push("(");
    for (idx, part) in parts.iter().enumerate() {
        if idx > 0 {
            builder.push(separator);
        }
        push_predicate(builder, part);
    }
    builder.push(")");
}

/// `%needle%` with LIKE wildcards in the needle escaped.
fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

struct CustomerRow {
    id: CustomerId,
    version: u64,
    person: PersonData,
    created: AuditStamp,
    modified: AuditStamp,
}

fn decode_customer_row(row: &PgRow) -> StoreResult<CustomerRow> {
    Ok(CustomerRow {
        id: CustomerId::from_uuid(get(row, "customer_id")?),
        version: version_from_db(get(row, "version")?)?,
        person: PersonData {
            name: get(row, "name")?,
            first_name: get(row, "first_name")?,
            date_of_birth: get(row, "date_of_birth")?,
        },
        created: AuditStamp {
            at: get(row, "created")?,
            by: get(row, "created_by")?,
        },
        modified: AuditStamp {
            at: get(row, "modified")?,
            by: get(row, "modified_by")?,
        },
    })
}

/// Load owned rows for a set of customer rows and rebuild the aggregates,
/// preserving the order of `rows`.
async fn load_aggregates(
    conn: &mut PgConnection,
    rows: Vec<CustomerRow>,
) -> StoreResult<Vec<Customer>> {
    if rows.is_empty() {
        return Ok(vec![]);
    }
    let ids: Vec<Uuid> = rows.iter().map(|r| *r.id.as_uuid()).collect();

    let address_rows = sqlx::query(
        r#"
        SELECT address_id, customer_id, address_type, street, number, postal, city
        FROM address
        WHERE customer_id = ANY($1)
        ORDER BY position
        "#,
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("load_addresses", e))?;

    let mut addresses: HashMap<CustomerId, Vec<Address>> = HashMap::new();
    for row in &address_rows {
        let address = decode_address(row)?;
        addresses.entry(address.customer_id).or_default().push(address);
    }

    let communication_rows = sqlx::query(
        r#"
        SELECT communication_id, customer_id, email
        FROM communication
        WHERE customer_id = ANY($1)
        ORDER BY position
        "#,
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("load_communications", e))?;

    let mut communication_ids = Vec::with_capacity(communication_rows.len());
    let mut communications: Vec<Communication> = Vec::with_capacity(communication_rows.len());
    for row in &communication_rows {
        let communication = decode_communication(row)?;
        communication_ids.push(*communication.id.as_uuid());
        communications.push(communication);
    }

    let phone_rows = sqlx::query(
        r#"
        SELECT phone_id, communication_id, phone_type, phone_number
        FROM phone
        WHERE communication_id = ANY($1)
        ORDER BY position
        "#,
    )
    .bind(&communication_ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("load_phones", e))?;

    let mut phones: HashMap<CommunicationId, Vec<Phone>> = HashMap::new();
    for row in &phone_rows {
        let phone = decode_phone(row)?;
        phones.entry(phone.communication_id).or_default().push(phone);
    }

    let mut by_customer: HashMap<CustomerId, Vec<Communication>> = HashMap::new();
    for mut communication in communications {
        communication.phones = phones.remove(&communication.id).unwrap_or_default();
        by_customer
            .entry(communication.customer_id)
            .or_default()
            .push(communication);
    }

    rows.into_iter()
        .map(|row| {
            let id = row.id;
            Customer::rehydrate(CustomerSnapshot {
                id,
                version: row.version,
                person: row.person,
                created: row.created,
                modified: row.modified,
                addresses: addresses.remove(&id).unwrap_or_default(),
                communications: by_customer.remove(&id).unwrap_or_default(),
            })
            .map_err(|e| StoreError::Backend(format!("corrupt rows for customer {id}: {e}")))
        })
        .collect()
}

async fn insert_children(conn: &mut PgConnection, customer: &Customer) -> StoreResult<()> {
    if !customer.addresses().is_empty() {
        let mut builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO address (address_id, customer_id, address_type, street, number, postal, city, position) ",
        );
        builder.push_values(customer.addresses().iter().enumerate(), |mut row, (position, a)| {
            row.push_bind(*a.id.as_uuid())
                .push_bind(*a.customer_id.as_uuid())
                .push_bind(a.address_type.as_str())
                .push_bind(a.street.clone())
                .push_bind(a.number.clone())
                .push_bind(a.postal.clone())
                .push_bind(a.city.clone())
                .push_bind(position_to_db(position));
        });
        builder
            .build()
            .execute(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("insert_addresses", e))?;
    }

    if customer.communications().is_empty() {
        return Ok(());
    }

    let mut builder = QueryBuilder::<Postgres>::new(
        "INSERT INTO communication (communication_id, customer_id, email, position) ",
    );
    builder.push_values(
        customer.communications().iter().enumerate(),
        |mut row, (position, c)| {
            row.push_bind(*c.id.as_uuid())
                .push_bind(*c.customer_id.as_uuid())
                .push_bind(c.email.clone())
                .push_bind(position_to_db(position));
        },
    );
    builder
        .build()
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("insert_communications", e))?;

    let phones: Vec<(usize, &Phone)> = customer
        .communications()
        .iter()
        .flat_map(|c| c.phones.iter().enumerate())
        .collect();
    if phones.is_empty() {
        return Ok(());
    }

    let mut builder = QueryBuilder::<Postgres>::new(
        "INSERT INTO phone (phone_id, communication_id, phone_type, phone_number, position) ",
    );
    builder.push_values(phones, |mut row, (position, p)| {
        row.push_bind(*p.id.as_uuid())
            .push_bind(*p.communication_id.as_uuid())
            .push_bind(p.phone_type.as_str())
            .push_bind(p.phone_number.clone())
            .push_bind(position_to_db(position));
    });
    builder
        .build()
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("insert_phones", e))?;

    Ok(())
}

fn decode_address(row: &PgRow) -> StoreResult<Address> {
    let address_type: String = get(row, "address_type")?;
    Ok(Address {
        id: AddressId::from_uuid(get(row, "address_id")?),
        customer_id: CustomerId::from_uuid(get(row, "customer_id")?),
        address_type: address_type
            .parse()
            .map_err(|e| StoreError::Backend(format!("decode address: {e}")))?,
        street: get(row, "street")?,
        number: get(row, "number")?,
        postal: get(row, "postal")?,
        city: get(row, "city")?,
    })
}

fn decode_communication(row: &PgRow) -> StoreResult<Communication> {
    Ok(Communication {
        id: CommunicationId::from_uuid(get(row, "communication_id")?),
        customer_id: CustomerId::from_uuid(get(row, "customer_id")?),
        email: get(row, "email")?,
        phones: vec![],
    })
}

fn decode_phone(row: &PgRow) -> StoreResult<Phone> {
    let phone_type: String = get(row, "phone_type")?;
    Ok(Phone {
        id: PhoneId::from_uuid(get(row, "phone_id")?),
        communication_id: CommunicationId::from_uuid(get(row, "communication_id")?),
        phone_type: phone_type
            .parse()
            .map_err(|e| StoreError::Backend(format!("decode phone: {e}")))?,
        phone_number: get(row, "phone_number")?,
    })
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> StoreResult<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Backend(format!("decode column {column}: {e}")))
}

fn version_to_db(version: u64) -> i64 {
    i64::try_from(version).unwrap_or(i64::MAX)
}

fn version_from_db(version: i64) -> StoreResult<u64> {
    u64::try_from(version).map_err(|_| StoreError::Backend(format!("negative version {version}")))
}

fn position_to_db(position: usize) -> i32 {
    i32::try_from(position).unwrap_or(i32::MAX)
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                if code == "23505" {
                    return map_unique_violation(db_err.as_ref());
                }
                if let Some(mapped) = map_sqlstate(&code, db_err.message()) {
                    return mapped;
                }
            }
            StoreError::Backend(format!("database error in {}: {}", operation, db_err.message()))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        other => StoreError::Backend(format!("{} failed: {}", operation, other)),
    }
}

fn map_unique_violation(db_err: &dyn sqlx::error::DatabaseError) -> StoreError {
    let value = db_err
        .try_downcast_ref::<PgDatabaseError>()
        .and_then(|pg| pg.detail())
        .and_then(conflicting_value);

    match db_err.constraint() {
        Some(EMAIL_CONSTRAINT) => {
            StoreError::DuplicateEmail(value.unwrap_or_else(|| db_err.message().to_string()))
        }
        Some(PHONE_CONSTRAINT) => {
            StoreError::DuplicatePhone(value.unwrap_or_else(|| db_err.message().to_string()))
        }
        other => StoreError::Constraint(format!(
            "{} ({})",
            db_err.message(),
            other.unwrap_or("unnamed constraint")
        )),
    }
}

/// Map SQLSTATE codes that need no constraint detail.
fn map_sqlstate(code: &str, message: &str) -> Option<StoreError> {
    match code {
        // serialization_failure, deadlock_detected
        "40001" | "40P01" => Some(StoreError::Aborted(format!("{message} ({code})"))),
        // Remaining class 23 integrity violations (foreign key, not null, check).
        code if code.starts_with("23") => {
            Some(StoreError::Constraint(format!("{message} ({code})")))
        }
        _ => None,
    }
}

/// Extract the value from a unique-violation detail such as
/// `Key (email)=(a@example.com) already exists.`
fn conflicting_value(detail: &str) -> Option<String> {
    let start = detail.find(")=(")? + 3;
    let end = detail.rfind(") already exists")?;
    detail.get(start..end).map(str::to_string)
}
