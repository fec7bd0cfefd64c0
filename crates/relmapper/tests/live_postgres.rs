//! Integration tests against a real PostgreSQL server.
//!
//! Set `RELMAPPER_TEST_DATABASE_URL` (a libpq connection string) to run them;
//! otherwise every test returns immediately. Each test works in its own
//! throwaway schema.

use std::sync::Arc;

use relmapper::{
    AdministratorMapper, Connection, MapperConfig, PgConnection, PkValue, Record, RoleMapper,
    SqlValue, TableMapper,
};

struct Fixture {
    conn: Arc<PgConnection>,
    schema: String,
}

impl Fixture {
    async fn setup() -> Option<Self> {
        let url = std::env::var("RELMAPPER_TEST_DATABASE_URL").ok()?;
        let conn = Arc::new(PgConnection::connect_str(&url).await.unwrap());
        let schema = format!("relmapper_{}", uuid::Uuid::new_v4().simple());

        let ddl = [
            format!("CREATE SCHEMA {schema}"),
            format!(
                "CREATE TABLE {schema}.roles (
                    id serial PRIMARY KEY,
                    role varchar(64) NOT NULL UNIQUE)"
            ),
            format!(
                "CREATE TABLE {schema}.administrators (
                    id serial PRIMARY KEY,
                    username varchar(64) NOT NULL UNIQUE,
                    name varchar(128),
                    email varchar(128),
                    active boolean NOT NULL DEFAULT true)"
            ),
            format!(
                "CREATE TABLE {schema}.administrator_roles (
                    administrator_id integer NOT NULL REFERENCES {schema}.administrators (id),
                    role_id integer NOT NULL REFERENCES {schema}.roles (id),
                    PRIMARY KEY (administrator_id, role_id))"
            ),
            format!(
                "CREATE TABLE {schema}.permissions (
                    id serial PRIMARY KEY,
                    title varchar(128) NOT NULL UNIQUE,
                    description text)"
            ),
            format!(
                "CREATE TABLE {schema}.roles_permissions (
                    role_id integer NOT NULL REFERENCES {schema}.roles (id),
                    permission_id integer NOT NULL REFERENCES {schema}.permissions (id),
                    PRIMARY KEY (role_id, permission_id))"
            ),
        ];
        for statement in &ddl {
            conn.execute(statement, &[]).await.unwrap();
        }

        Some(Self { conn, schema })
    }

    fn conn(&self) -> Arc<dyn Connection> {
        self.conn.clone()
    }

    async fn roles(&self) -> RoleMapper {
        RoleMapper::load(self.conn(), &self.schema, &MapperConfig::default())
            .await
            .unwrap()
    }

    async fn administrators(&self) -> AdministratorMapper {
        AdministratorMapper::load(self.conn(), &self.schema, &MapperConfig::default())
            .await
            .unwrap()
    }

    async fn teardown(self) {
        let _ = self
            .conn
            .execute(&format!("DROP SCHEMA {} CASCADE", self.schema), &[])
            .await;
    }
}

fn admin(username: &str) -> Record {
    Record::new()
        .with("username", username)
        .with("name", "")
        .with("email", "")
        .with("active", "")
}

#[tokio::test]
async fn test_introspected_descriptor() {
    let Some(fx) = Fixture::setup().await else {
        return;
    };

    let mapper = TableMapper::load(fx.conn(), &fx.schema, "administrators", &MapperConfig::default())
        .await
        .unwrap();
    let table = mapper.descriptor();

    assert_eq!(table.primary_key(), Some("id"));
    assert!(table.column("id").unwrap().is_sequence_backed());
    assert!(table.column("username").unwrap().is_unique());
    assert_eq!(table.column("username").unwrap().max_length(), Some(64));
    assert!(table.column("name").unwrap().nullable());
    assert!(!table.column("active").unwrap().nullable());

    let join = TableMapper::load(fx.conn(), &fx.schema, "administrator_roles", &MapperConfig::default())
        .await
        .unwrap();
    assert_eq!(join.descriptor().primary_key(), None);

    fx.teardown().await;
}

#[tokio::test]
async fn test_failed_association_insert_leaves_no_primary_row() {
    let Some(fx) = Fixture::setup().await else {
        return;
    };
    let roles = fx.roles().await;
    let administrators = fx.administrators().await;
    let editor = roles.create("editor").await.unwrap();

    let err = administrators
        .create(admin("ghost"), &[editor, PkValue::Int(999_999)])
        .await
        .unwrap_err();

    assert!(err.is_query_failure());
    assert!(!administrators.username_exists("ghost", None).await.unwrap());

    fx.teardown().await;
}

#[tokio::test]
async fn test_role_swap_is_atomic() {
    let Some(fx) = Fixture::setup().await else {
        return;
    };
    let roles = fx.roles().await;
    let administrators = fx.administrators().await;
    let a = roles.create("a").await.unwrap();
    let b = roles.create("b").await.unwrap();
    let c = roles.create("c").await.unwrap();

    let id = administrators
        .create(admin("bob"), &[a.clone(), b.clone()])
        .await
        .unwrap();
    let changed = administrators
        .update(&id, &Record::new().with("username", "bob"), &[b.clone(), c.clone()])
        .await
        .unwrap();
    assert!(changed);

    let bob = administrators.get(&id).await.unwrap();
    assert_eq!(bob.role_ids(), vec![b.clone(), c.clone()]);

    administrators
        .update(&id, &Record::new().with("name", "Bob"), &[b.clone(), c.clone()])
        .await
        .unwrap();

    // Removing a role the administrator no longer holds rolls everything back.
    let stale = relmapper::ChangeSet {
        columns: Record::new().with("name", "Robert"),
        associations: relmapper::mapper::AssociationChange {
            add: vec![],
            remove: vec![a],
        },
    };
    let err = administrators.do_update(&id, &stale).await.unwrap_err();
    assert!(err.is_not_found());
    let bob = administrators.get(&id).await.unwrap();
    assert_eq!(bob.fields.get("name"), Some(&SqlValue::from("Bob")));
    assert_eq!(bob.role_ids(), vec![b, c]);

    fx.teardown().await;
}

#[tokio::test]
async fn test_association_filter_keeps_sibling_roles() {
    let Some(fx) = Fixture::setup().await else {
        return;
    };
    let roles = fx.roles().await;
    let administrators = fx.administrators().await;
    let editor = roles.create("editor").await.unwrap();
    let viewer = roles.create("viewer").await.unwrap();
    administrators
        .create(admin("alice"), &[editor.clone(), viewer.clone()])
        .await
        .unwrap();
    administrators.create(admin("carol"), &[viewer]).await.unwrap();

    let found = administrators
        .get_objects("role:=:editor", None, None)
        .await
        .unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].username, "alice");
    assert_eq!(found[0].roles.len(), 2);

    fx.teardown().await;
}

#[tokio::test]
async fn test_list_view_degrades_on_query_failure() {
    let Some(fx) = Fixture::setup().await else {
        return;
    };
    let administrators = fx.administrators().await;

    let view = administrators
        .list_view("", Some("\"administrators\".\"missing\""), None)
        .await
        .unwrap();

    assert!(view.items.is_empty());
    assert!(view.notice.is_some());

    fx.teardown().await;
}
