//! Shared seed data for service tests

use std::sync::Arc;

use super::complaints::NewComplaint;
use super::Services;
use crate::config::Config;
use crate::db::users::{self, NewUser};
use crate::db::Database;
use crate::types::{Category, Complaint, ComplaintVisibility, Role, User};

pub(crate) struct Fixture {
    pub db: Arc<Database>,
    pub services: Services,
    pub citizen: User,
    pub neighbour: User,
    pub officer: User,
    pub colleague: User,
    pub far_officer: User,
    pub admin: User,
}

fn seed_user(db: &Database, name: &str, role: Role, ward: Option<u32>) -> User {
    db.with_conn(|conn| {
        users::insert_user(
            conn,
            &NewUser {
                subject: Some(format!("sub-{}", name)),
                email: Some(format!("{}@example.org", name)),
                role,
                ward,
                display_name: name.to_string(),
                phone: None,
            },
        )
    })
    .unwrap()
}

pub(crate) fn fixture() -> Fixture {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let services = Services::with_outbox(db.clone(), &Config::default());

    Fixture {
        citizen: seed_user(&db, "asha", Role::Citizen, Some(3)),
        neighbour: seed_user(&db, "bilal", Role::Citizen, Some(3)),
        officer: seed_user(&db, "officer3", Role::Officer, Some(3)),
        colleague: seed_user(&db, "colleague3", Role::Officer, Some(3)),
        far_officer: seed_user(&db, "officer7", Role::Officer, Some(7)),
        admin: seed_user(&db, "admin", Role::Admin, None),
        db,
        services,
    }
}

impl Fixture {
    pub fn file(&self, visibility: ComplaintVisibility) -> Complaint {
        self.services
            .complaints
            .create(
                &self.citizen.actor(),
                NewComplaint {
                    title: "Broken streetlight".into(),
                    description: "Lamp post 14 has been dark for a week".into(),
                    category: Category::StreetLighting,
                    ward: 3,
                    address: Some("MG Road".into()),
                    visibility,
                },
            )
            .unwrap()
    }

    pub fn pending_notifications(&self, user: &User) -> usize {
        self.db
            .with_conn(|conn| crate::db::notifications::list_pending_for_user(conn, &user.id))
            .unwrap()
            .len()
    }
}
