use rocket::Route;

mod common;
mod register;
mod voting;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(register::routes());
    routes.extend(voting::routes());
    routes
}
