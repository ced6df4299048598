#[rocket::launch]
fn rocket() -> _ {
    let rocket = member_ingest::rocket();
    log::info!("starting member ingest API");
    rocket
}
