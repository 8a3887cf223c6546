#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

use crate::{
    config::{ConfigFairing, DatabaseFairing, NotificationFairing},
    logging::LoggerFairing,
};

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod notification;
mod scheduled_task;

pub use config::Config;

/// Build the server, sending email through Amazon SES.
pub fn build() -> Rocket<Build> {
    assemble(rocket::build(), NotificationFairing::ses())
}

fn assemble(rocket: Rocket<Build>, notifications: NotificationFairing) -> Rocket<Build> {
    rocket
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(DatabaseFairing)
        .attach(notifications)
        .mount("/", api::routes())
        .register("/", error::catchers())
}

/// Build a server against the given database, with the positions
/// Chair, Secretary and Treasurer, that delivers email to a managed
/// [`notification::Mailbox`].
#[cfg(test)]
fn rocket_for_test(db_name: &str) -> Rocket<Build> {
    use std::sync::Arc;

    let mailbox = notification::Mailbox::default();
    let figment = rocket::Config::figment()
        .merge(("db_name", db_name))
        .merge(("positions", ["Chair", "Secretary", "Treasurer"]))
        .merge(("email_retry_interval", 1));
    assemble(
        rocket::custom(figment),
        NotificationFairing::with_mailer(Arc::new(mailbox.clone())),
    )
    .manage(mailbox)
}
