use actix_web::{get, post, web, App, HttpResponse, HttpServer, Responder};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs::read_to_string;
use uuid::Uuid;

mod conversation;
mod intent;
mod normalize;
mod pipeline;
mod proxy;
mod remote;
mod render;
mod select;
mod session;
mod settings;

#[cfg(test)]
mod integration_tests;

use intent::Catalog;
use pipeline::{ChatEngine, TurnOutcome};
use proxy::ProxyState;
use remote::RemoteClient;
use render::typing_stream;
use session::SessionRegistry;
use settings::Settings;

#[derive(Deserialize)]
struct ChatRequest {
    session_id: Uuid,
    message: String,
}

#[derive(Serialize)]
struct SessionCreated {
    session_id: Uuid,
    greeting: String,
}

#[post("/api/session")]
async fn create_session(sessions: web::Data<SessionRegistry>) -> impl Responder {
    let session = sessions.create();
    log::info!("session {} opened", session.id);
    HttpResponse::Ok().json(SessionCreated {
        session_id: session.id,
        greeting: sessions.greeting().to_string(),
    })
}

#[post("/api/chat")]
async fn chat(
    engine: web::Data<ChatEngine>,
    sessions: web::Data<SessionRegistry>,
    req: web::Json<ChatRequest>,
) -> HttpResponse {
    let Some(session) = sessions.get(req.session_id) else {
        return HttpResponse::NotFound().json(serde_json::json!({ "error": "unknown session" }));
    };

    match engine.run_turn(&session, &req.message).await {
        // Empty input and render contention are both silent no-ops.
        TurnOutcome::Ignored | TurnOutcome::Busy => HttpResponse::NoContent().finish(),
        TurnOutcome::Reply { text, guard, .. } => HttpResponse::Ok()
            .content_type("text/plain; charset=utf-8")
            .streaming(typing_stream(text, session, engine.render_config(), guard)),
    }
}

#[get("/api/session/{id}/transcript")]
async fn transcript(
    sessions: web::Data<SessionRegistry>,
    path: web::Path<Uuid>,
) -> HttpResponse {
    match sessions.get(path.into_inner()) {
        Some(session) => HttpResponse::Ok().json(&session.state().transcript),
        None => HttpResponse::NotFound().json(serde_json::json!({ "error": "unknown session" })),
    }
}

#[get("/")]
async fn index() -> impl Responder {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(include_str!("index.html"))
}

fn load_catalog(settings: &Settings) -> Result<Catalog> {
    match &settings.intents_file {
        Some(path) => {
            log::info!("loading intent catalog from '{}'", path);
            Catalog::from_json(&read_to_string(path)?)
        }
        None => Catalog::builtin(),
    }
}

#[actix_web::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::load()?;
    let catalog = load_catalog(&settings)?;
    log::info!(
        "initializing chat pipeline with {} intents ({} fallback lines)",
        catalog.len(),
        catalog.fallback().len()
    );

    let remote = if settings.remote_enabled {
        Some(RemoteClient::new(settings.proxy_url.clone())?)
    } else {
        log::warn!("remote fallback disabled; unmatched input uses the canned pool only");
        None
    };

    let greeting = catalog.greeting().to_string();
    let engine = web::Data::new(ChatEngine::new(catalog, remote, settings.render));
    let sessions = web::Data::new(SessionRegistry::new(settings.max_history_turns, greeting));
    let proxy_state = web::Data::new(ProxyState::new(settings.upstream.clone())?);

    let assets_dir = settings.assets_dir.clone();
    let (host, port) = (settings.host.clone(), settings.port);

    log::info!("starting server at http://{}:{}", host, port);
    HttpServer::new(move || {
        App::new()
            .app_data(engine.clone())
            .app_data(sessions.clone())
            .app_data(proxy_state.clone())
            .service(index)
            .service(create_session)
            .service(chat)
            .service(transcript)
            .service(
                web::resource("/api/model")
                    .route(web::post().to(proxy::handle))
                    .default_service(web::route().to(proxy::method_not_allowed)),
            )
            .service(actix_files::Files::new("/assets", assets_dir.clone()))
    })
    .bind((host, port))?
    .run()
    .await?;
    Ok(())
}
