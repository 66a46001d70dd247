//! Engine reconciliation and deployment behavior.

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};

use flowcord::engine::EngineConfig;
use flowcord::flow::state::FlowContextState;
use flowcord::model::GatewayEvent;
use flowcord::resume::{EntityLinks, ResumePoint, ResumePointKind};
use flowcord::store::Entitlement;

use common::*;

#[tokio::test]
async fn populate_mirrors_enabled_apps_and_prunes_disabled_ones() {
    let stores = Arc::new(MemoryStores::default());
    stores.apps.lock().push(app("a1"));
    stores
        .commands
        .lock()
        .push(command("c1", "a1", response_flow("ping", "pong")));
    let (engine, discord) = test_engine(EngineConfig::default(), &stores);

    engine.populate().await.unwrap();
    assert_eq!(engine.app_count(), 1);

    engine
        .route_event(
            "a1",
            GatewayEvent::InteractionCreate(command_interaction("ping")),
        )
        .await
        .unwrap();
    assert_eq!(discord.responses.lock().len(), 1);

    {
        let mut apps = stores.apps.lock();
        apps[0].enabled = false;
        apps[0].updated_at = Utc::now();
    }
    engine.populate().await.unwrap();
    assert_eq!(engine.app_count(), 0);
}

#[tokio::test]
async fn deploy_stamps_commands_and_runs_once_per_change() {
    let stores = Arc::new(MemoryStores::default());
    stores.apps.lock().push(app("a1"));
    stores
        .commands
        .lock()
        .push(command("c1", "a1", response_flow("ping", "pong")));
    let (engine, discord) = test_engine(EngineConfig::default(), &stores);

    engine.populate().await.unwrap();
    engine.deploy_pending().await;

    {
        let deployed = discord.deployed_commands.lock();
        assert_eq!(deployed.len(), 1);
        assert_eq!(deployed[0].len(), 1);
        assert_eq!(deployed[0][0].name, "ping");
    }
    assert!(stores.commands.lock()[0].last_deployed_at.is_some());

    // Nothing changed, so the next pass must not push again.
    engine.deploy_pending().await;
    assert_eq!(discord.deployed_commands.lock().len(), 1);
}

#[tokio::test]
async fn conflicting_command_names_never_reach_discord() {
    let stores = Arc::new(MemoryStores::default());
    stores.apps.lock().push(app("a1"));
    {
        let mut commands = stores.commands.lock();
        commands.push(command("c1", "a1", response_flow("settings", "root")));
        commands.push(command(
            "c2",
            "a1",
            response_flow("settings view", "nested"),
        ));
    }
    let (engine, discord) = test_engine(EngineConfig::default(), &stores);

    engine.populate().await.unwrap();
    engine.deploy_pending().await;

    assert!(discord.deployed_commands.lock().is_empty());
    let errors = stores.error_logs();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("mixed nested and unnested commands"));
}

#[tokio::test]
async fn maintenance_sweeps_expired_points_and_grants_roles() {
    let stores = Arc::new(MemoryStores::default());
    stores.apps.lock().push(app("a1"));

    let mut expired = ResumePoint::new(
        ResumePointKind::ModalSubmit,
        "a1",
        EntityLinks::command("c1"),
        "2",
        FlowContextState::default(),
    );
    expired.expires_at = Some(Utc::now() - Duration::minutes(1));
    let live = ResumePoint::new(
        ResumePointKind::MessageComponent,
        "a1",
        EntityLinks::message_instance(1),
        "2",
        FlowContextState::default(),
    );
    {
        let mut points = stores.resume_points.lock();
        points.insert(expired.id.clone(), expired);
        points.insert(live.id.clone(), live.clone());
    }
    stores.entitlements.lock().push(Entitlement {
        id: "e1".to_owned(),
        app_id: "a1".to_owned(),
        guild_id: "g1".to_owned(),
        user_id: "u1".to_owned(),
        role_id: "r1".to_owned(),
        granted: false,
        ends_at: None,
    });

    let (engine, discord) = test_engine(EngineConfig::default(), &stores);
    engine.run_maintenance().await;

    {
        let points = stores.resume_points.lock();
        assert_eq!(points.len(), 1);
        assert!(points.contains_key(&live.id));
    }
    assert_eq!(
        discord.moderation_calls.lock().as_slice(),
        ["role_add g1 u1 r1"]
    );
    assert!(stores.entitlements.lock()[0].granted);

    // A granted entitlement is not granted again.
    engine.run_maintenance().await;
    assert_eq!(discord.moderation_calls.lock().len(), 1);
}
