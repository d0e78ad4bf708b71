mod common;

use common::{complaint_form, image_part, jpeg, png, MUMBAI};
use serde_json::Value;
use water_talk::utils::image::MAX_IMAGE_BYTES;

const PUNE: (f64, f64) = (18.5204, 73.8567);

fn ngo_ids(body: &Value) -> Vec<String> {
    body["data"]["ngo_ids"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect()
}

async fn file_complaint(app: &common::TestApp, token: &str, location: (f64, f64)) -> String {
    let form = complaint_form("Oil slick near pier", Some(location), None);
    let (status, body) = common::submit_complaint(app, token, form).await;
    assert_eq!(status, 200, "submit failed: {}", body);
    body["data"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn submit_with_photo_then_list() {
    let app = common::spawn_app().await;
    let (citizen_id, token) = common::create_citizen(&app).await;

    let form = complaint_form(
        "Oil slick near pier",
        Some((19.07, 72.87)),
        Some(image_part(jpeg(400, 400), "image/jpeg", "slick.jpg")),
    );
    let (status, body) = common::submit_complaint(&app, &token, form).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["status"], "Reported");
    assert_eq!(body["data"]["user_id"], citizen_id.to_string());
    assert_eq!(body["data"]["description"], "Oil slick near pier");
    assert_eq!(body["data"]["location"]["latitude"], 19.07);
    assert_eq!(body["data"]["citizen_approval"], false);
    assert!(ngo_ids(&body).is_empty());

    let image_url = body["data"]["image_url"].as_str().unwrap().to_string();
    assert!(image_url.starts_with(&format!("/uploads/complaints/{}/", citizen_id)));
    assert!(image_url.ends_with(".jpg"));

    // The stored photo is served back.
    let resp = app
        .client
        .get(format!("{}{}", app.addr, image_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.bytes().await.unwrap().to_vec(), jpeg(400, 400));

    let (status, body) = common::get_json(&app, &token, "/complaints").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["image_url"], image_url.as_str());

    let (status, body) = common::get_json(&app, &token, "/complaints/mine").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["total"], 1);
}

#[tokio::test]
async fn submit_reports_missing_description_and_location() {
    let app = common::spawn_app().await;
    let (_, token) = common::create_citizen(&app).await;

    let form = complaint_form("   ", None, None);
    let (status, body) = common::submit_complaint(&app, &token, form).await;
    assert_eq!(status, 400);
    assert_eq!(body["fields"]["description"], "Description is required");
    assert_eq!(body["fields"]["location"], "Please select a location on the map");

    let (_, body) = common::get_json(&app, &token, "/complaints").await;
    assert_eq!(body["data"]["total"], 0);
}

#[tokio::test]
async fn invalid_form_stores_no_image() {
    let app = common::spawn_app().await;
    let (_, token) = common::create_citizen(&app).await;

    let form = complaint_form(
        "",
        Some((19.07, 72.87)),
        Some(image_part(jpeg(400, 400), "image/jpeg", "slick.jpg")),
    );
    let (status, body) = common::submit_complaint(&app, &token, form).await;
    assert_eq!(status, 400);
    assert_eq!(body["fields"]["description"], "Description is required");

    let form = complaint_form(
        "Oil slick near pier",
        None,
        Some(image_part(jpeg(400, 400), "image/jpeg", "slick.jpg")),
    );
    let (status, body) = common::submit_complaint(&app, &token, form).await;
    assert_eq!(status, 400);
    assert_eq!(body["fields"]["location"], "Please select a location on the map");

    let stored = std::fs::read_dir(&app.upload_dir).unwrap().count();
    assert_eq!(stored, 0);
    let (_, body) = common::get_json(&app, &token, "/complaints").await;
    assert_eq!(body["data"]["total"], 0);
}

#[tokio::test]
async fn page_far_past_the_end_is_empty() {
    let app = common::spawn_app().await;
    let (_, token) = common::create_citizen(&app).await;
    file_complaint(&app, &token, MUMBAI).await;

    let path = format!("/complaints?page={}&per_page=100", u64::MAX);
    let (status, body) = common::get_json(&app, &token, &path).await;
    assert_eq!(status, 200);
    assert!(body["data"]["items"].as_array().unwrap().is_empty());
    assert_eq!(body["data"]["total"], 1);

    let path = format!("/complaints/mine?page={}", u64::MAX);
    let (status, _) = common::get_json(&app, &token, &path).await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn submit_rejects_oversized_image() {
    let app = common::spawn_app().await;
    let (_, token) = common::create_citizen(&app).await;

    let mut data = jpeg(400, 400);
    data.resize(MAX_IMAGE_BYTES + 1, 0);
    let form = complaint_form(
        "Dead fish along the bank",
        Some(MUMBAI),
        Some(image_part(data, "image/jpeg", "big.jpg")),
    );
    let (status, body) = common::submit_complaint(&app, &token, form).await;
    assert_eq!(status, 413);
    assert_eq!(body["error"], "Image must be smaller than 5MB");

    let (_, body) = common::get_json(&app, &token, "/complaints").await;
    assert_eq!(body["data"]["total"], 0);
}

#[tokio::test]
async fn submit_rejects_small_or_unsupported_image() {
    let app = common::spawn_app().await;
    let (_, token) = common::create_citizen(&app).await;

    let form = complaint_form(
        "Dead fish along the bank",
        Some(MUMBAI),
        Some(image_part(png(100, 100), "image/png", "tiny.png")),
    );
    let (status, body) = common::submit_complaint(&app, &token, form).await;
    assert_eq!(status, 400);
    assert_eq!(
        body["error"],
        "Image must be at least 200×200 pixels for clear visibility"
    );

    let form = complaint_form(
        "Dead fish along the bank",
        Some(MUMBAI),
        Some(image_part(b"%PDF-1.4".to_vec(), "application/pdf", "report.pdf")),
    );
    let (status, body) = common::submit_complaint(&app, &token, form).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Only JPG, PNG, and WebP images are allowed");
}

#[tokio::test]
async fn only_citizens_submit_and_only_ngos_accept() {
    let app = common::spawn_app().await;
    let (_, citizen) = common::create_citizen(&app).await;
    let (_, ngo) = common::create_ngo(&app, "Clean Creeks Trust", Some(MUMBAI)).await;

    let form = complaint_form("Foam on the creek", Some(MUMBAI), None);
    let (status, _) = common::submit_complaint(&app, &ngo, form).await;
    assert_eq!(status, 403);

    let id = file_complaint(&app, &citizen, MUMBAI).await;
    let (status, _) = common::post_empty(&app, &citizen, &format!("/complaints/{}/accept", id)).await;
    assert_eq!(status, 403);
}

#[tokio::test]
async fn accept_is_idempotent_and_notifies_owner() {
    let app = common::spawn_app().await;
    let (citizen_id, citizen) = common::create_citizen(&app).await;
    let (ngo_id, ngo) = common::create_ngo(&app, "Clean Creeks Trust", Some(MUMBAI)).await;
    let (other_id, other) = common::create_ngo(&app, "River Watch", Some(MUMBAI)).await;
    let id = file_complaint(&app, &citizen, (19.07, 72.87)).await;

    let mut feed = app.state.feed.subscribe(citizen_id);
    let path = format!("/complaints/{}/accept", id);

    let (status, body) = common::post_empty(&app, &ngo, &path).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["status"], "Active");
    assert_eq!(ngo_ids(&body), vec![ngo_id.to_string()]);

    let event = feed.recv().await.unwrap();
    let event = serde_json::to_value(&event).unwrap();
    assert_eq!(event["type"], "complaint_accepted");
    assert_eq!(
        event["message"],
        format!("Your complaint ({}) has been accepted by the NGO!", id)
    );

    let (status, body) = common::post_empty(&app, &ngo, &path).await;
    assert_eq!(status, 200);
    assert_eq!(ngo_ids(&body), vec![ngo_id.to_string()]);

    let (status, body) = common::post_empty(&app, &other, &path).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["status"], "Active");
    assert_eq!(ngo_ids(&body), vec![ngo_id.to_string(), other_id.to_string()]);

    let (_, body) = common::get_json(&app, &citizen, &format!("/complaints/{}", id)).await;
    assert_eq!(ngo_ids(&body).len(), 2);
}

#[tokio::test]
async fn completion_then_approval_closes_complaint() {
    let app = common::spawn_app().await;
    let (_, citizen) = common::create_citizen(&app).await;
    let (_, ngo) = common::create_ngo(&app, "Clean Creeks Trust", Some(MUMBAI)).await;
    let (_, outsider) = common::create_ngo(&app, "River Watch", Some(MUMBAI)).await;
    let id = file_complaint(&app, &citizen, MUMBAI).await;

    // Approving before any proof exists is refused.
    let (status, _) = common::post_empty(&app, &citizen, &format!("/complaints/{}/approve", id)).await;
    assert_eq!(status, 409);

    common::post_empty(&app, &ngo, &format!("/complaints/{}/accept", id)).await;

    let completion = |token: String| {
        let client = app.client.clone();
        let url = app.url(&format!("/complaints/{}/completion", id));
        async move {
            let form = reqwest::multipart::Form::new()
                .part("image", image_part(png(640, 480), "image/png", "done.png"));
            let resp = client
                .post(url)
                .bearer_auth(token)
                .multipart(form)
                .send()
                .await
                .unwrap();
            let status = resp.status();
            let body: Value = resp.json().await.unwrap();
            (status, body)
        }
    };

    let (status, _) = completion(outsider.clone()).await;
    assert_eq!(status, 403);

    let (status, body) = completion(ngo.clone()).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["status"], "Active");
    let proof = body["data"]["completion_image_url"].as_str().unwrap();
    assert!(proof.starts_with(&format!("/uploads/completions/{}/", id)));
    assert!(proof.ends_with(".png"));

    let (status, _) = completion(ngo.clone()).await;
    assert_eq!(status, 409);

    let (status, _) = common::post_empty(&app, &ngo, &format!("/complaints/{}/approve", id)).await;
    assert_eq!(status, 403);

    let (status, body) = common::post_empty(&app, &citizen, &format!("/complaints/{}/approve", id)).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["status"], "Completed");
    assert_eq!(body["data"]["citizen_approval"], true);

    let (status, _) = common::post_empty(&app, &citizen, &format!("/complaints/{}/approve", id)).await;
    assert_eq!(status, 409);

    let (status, _) = common::post_empty(&app, &outsider, &format!("/complaints/{}/accept", id)).await;
    assert_eq!(status, 409);
}

#[tokio::test]
async fn completion_requires_an_image() {
    let app = common::spawn_app().await;
    let (_, citizen) = common::create_citizen(&app).await;
    let (_, ngo) = common::create_ngo(&app, "Clean Creeks Trust", Some(MUMBAI)).await;
    let id = file_complaint(&app, &citizen, MUMBAI).await;
    common::post_empty(&app, &ngo, &format!("/complaints/{}/accept", id)).await;

    let resp = app
        .client
        .post(app.url(&format!("/complaints/{}/completion", id)))
        .bearer_auth(&ngo)
        .multipart(reqwest::multipart::Form::new().text("note", "done"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["fields"]["image"], "Completion image is required");
}

#[tokio::test]
async fn status_filter_and_unknown_complaint() {
    let app = common::spawn_app().await;
    let (_, citizen) = common::create_citizen(&app).await;
    let (_, ngo) = common::create_ngo(&app, "Clean Creeks Trust", Some(MUMBAI)).await;
    let first = file_complaint(&app, &citizen, MUMBAI).await;
    file_complaint(&app, &citizen, MUMBAI).await;
    common::post_empty(&app, &ngo, &format!("/complaints/{}/accept", first)).await;

    let (_, body) = common::get_json(&app, &citizen, "/complaints?status=Active").await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["id"], first.as_str());

    // "Filed" is an accepted alias for Reported.
    let (_, body) = common::get_json(&app, &citizen, "/complaints?status=Filed").await;
    assert_eq!(body["data"]["total"], 1);

    let (status, _) = common::get_json(&app, &citizen, "/complaints?status=closed").await;
    assert_eq!(status, 400);

    let (status, _) = common::get_json(
        &app,
        &citizen,
        &format!("/complaints/{}", uuid::Uuid::new_v4()),
    )
    .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn nearby_filters_by_radius() {
    let app = common::spawn_app().await;
    let (_, citizen) = common::create_citizen(&app).await;
    let (_, ngo) = common::create_ngo(&app, "Clean Creeks Trust", Some(MUMBAI)).await;
    let close = file_complaint(&app, &citizen, (19.07, 72.87)).await;
    let far = file_complaint(&app, &citizen, PUNE).await;

    let (status, body) = common::get_json(&app, &ngo, "/complaints/nearby").await;
    assert_eq!(status, 200);
    let items = body["data"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], close.as_str());
    assert!(items[0]["distance_km"].as_f64().unwrap() < 2.0);

    let (_, body) = common::get_json(&app, &ngo, "/complaints/nearby?radius_km=500").await;
    let ids: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&far.as_str()));

    let (status, _) = common::get_json(&app, &ngo, "/complaints/nearby?radius_km=-1").await;
    assert_eq!(status, 400);

    let (status, _) = common::get_json(&app, &citizen, "/complaints/nearby").await;
    assert_eq!(status, 403);
}

#[tokio::test]
async fn ngo_without_location_sees_everything_nearby() {
    let app = common::spawn_app().await;
    let (_, citizen) = common::create_citizen(&app).await;
    let (_, ngo) = common::create_ngo(&app, "Roaming Volunteers", None).await;
    file_complaint(&app, &citizen, MUMBAI).await;
    file_complaint(&app, &citizen, PUNE).await;

    let (status, body) = common::get_json(&app, &ngo, "/complaints/nearby").await;
    assert_eq!(status, 200);
    let items = body["data"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|c| c["distance_km"].is_null()));
}

#[tokio::test]
async fn preview_checks_image_without_storing() {
    let app = common::spawn_app().await;
    let (_, token) = common::create_citizen(&app).await;

    let resp = app
        .client
        .post(app.url("/uploads/preview"))
        .bearer_auth(&token)
        .multipart(
            reqwest::multipart::Form::new()
                .part("image", image_part(jpeg(300, 250), "image/jpeg", "p.jpg")),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["width"], 300);
    assert_eq!(body["data"]["height"], 250);
    assert!(body["data"]["data_url"]
        .as_str()
        .unwrap()
        .starts_with("data:image/jpeg;base64,"));

    let stored = std::fs::read_dir(&app.upload_dir).unwrap().count();
    assert_eq!(stored, 0);

    let resp = app
        .client
        .post(app.url("/uploads/preview"))
        .bearer_auth(&token)
        .multipart(reqwest::multipart::Form::new().text("caption", "none"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["fields"]["image"], "Please choose an image");
}
