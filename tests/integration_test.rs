//! Integration tests for the world server core
//!
//! These tests verify the end-to-end behavior of:
//! - Spatial grid membership and queries
//! - Fixed-step scheduling and backlog capping
//! - Collision and standing resolution on a live map
//! - Message dispatch statistics
//! - A full TCP round trip through the connection handler

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use glam::Vec2;
use pretty_assertions::assert_eq;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;

use demogame_server::config::ServerConfig;
use demogame_server::game::collision::CollisionHandler;
use demogame_server::game::data::{MapDefinition, SpawnDefinition};
use demogame_server::game::events::WorldEvent;
use demogame_server::game::factory::{EntityFactory, EntityTemplate};
use demogame_server::game::map::PhysicsSettings;
use demogame_server::game::persistence::InMemoryRepository;
use demogame_server::game::scheduler::{MapUpdater, UpdateScheduler};
use demogame_server::game::{
    Entity, EntityId, EntityRole, GameWorld, ManualClock, Map, PlayerAction, WorldSettings,
};
use demogame_server::net::handler::accept_connections;
use demogame_server::net::{IngressEvent, MessageStats, PacketBuffer};
use demogame_server::protocol::{ClientMessage, ServerMessage};
use demogame_server::spatial::{CellCoord, Rect, SpatialGrid, SpatialKind};
use demogame_server::AppState;

fn template(id: u32, kind: &str, width: f32, height: f32) -> EntityTemplate {
    EntityTemplate {
        id,
        name: kind.to_string(),
        kind: kind.to_string(),
        width,
        height,
        weight: None,
        collides: true,
    }
}

fn town() -> MapDefinition {
    MapDefinition {
        id: 1,
        name: "Town".into(),
        width: 512.0,
        height: 512.0,
        spawns: vec![SpawnDefinition {
            template: 1,
            x: 0.0,
            y: 400.0,
        }],
    }
}

fn repository() -> Arc<InMemoryRepository> {
    Arc::new(InMemoryRepository::with_templates([
        template(1, "wall", 512.0, 32.0),
        template(2, "player", 16.0, 32.0),
    ]))
}

#[test]
fn test_grid_object_found_at_its_own_bounds() {
    let mut grid = SpatialGrid::new(Vec2::new(256.0, 256.0), 32).unwrap();
    let bounds = Rect::new(50.0, 70.0, 40.0, 10.0);
    grid.add(7u32, bounds, SpatialKind::NPC);

    let found: Vec<u32> = grid.query(bounds).collect();
    assert_eq!(found, vec![7]);
    assert_eq!(grid.first_at(Vec2::new(60.0, 75.0)), Some(7));
}

#[test]
fn test_grid_move_leaves_no_stale_membership() {
    let mut grid = SpatialGrid::new(Vec2::new(256.0, 256.0), 32).unwrap();
    grid.add(1u32, Rect::new(0.0, 0.0, 10.0, 10.0), SpatialKind::PLAYER);
    assert_eq!(grid.occupied_cells(1), vec![CellCoord::new(0, 0)]);

    grid.update(1, Rect::new(40.0, 40.0, 10.0, 10.0));
    assert_eq!(grid.occupied_cells(1), vec![CellCoord::new(1, 1)]);

    // The old segment no longer reports the key
    assert_eq!(grid.query(Rect::new(0.0, 0.0, 10.0, 10.0)).count(), 0);
    assert_eq!(grid.first_at(Vec2::new(45.0, 45.0)), Some(1));

    grid.remove(1);
    assert!(grid.query(Rect::new(0.0, 0.0, 256.0, 256.0)).next().is_none());
}

#[test]
fn test_grid_kind_filter() {
    let mut grid = SpatialGrid::new(Vec2::new(128.0, 128.0), 16).unwrap();
    grid.add(1u32, Rect::new(0.0, 0.0, 20.0, 20.0), SpatialKind::WALL);
    grid.add(2u32, Rect::new(5.0, 5.0, 5.0, 5.0), SpatialKind::NPC);

    let area = Rect::new(0.0, 0.0, 30.0, 30.0);
    let walls: Vec<u32> = grid.query_kind(area, SpatialKind::WALL).collect();
    assert_eq!(walls, vec![1]);
    assert_eq!(grid.query(area).count(), 2);
}

#[derive(Default)]
struct StepCounter {
    steps: u32,
}

impl MapUpdater for StepCounter {
    fn update_maps(&mut self, delta_ms: u32) {
        assert_eq!(delta_ms, 20);
        self.steps += 1;
    }
}

#[test]
fn test_scheduler_step_boundaries() {
    let mut scheduler = UpdateScheduler::new(20, 5000);
    let mut counter = StepCounter::default();
    scheduler.update(1000, &mut counter);

    assert_eq!(scheduler.update(1019, &mut counter).steps, 0);
    assert_eq!(scheduler.update(1020, &mut counter).steps, 1);
    assert_eq!(counter.steps, 1);
}

#[test]
fn test_scheduler_caps_backlog() {
    let mut scheduler = UpdateScheduler::new(20, 5000);
    let mut counter = StepCounter::default();
    scheduler.update(0, &mut counter);

    let report = scheduler.update(12_000, &mut counter);
    assert!(report.steps <= 5000 / 20 + 1);
    assert!(report.skipped_ms > 0);
}

struct CountingHandler(Arc<AtomicUsize>);

impl CollisionHandler for CountingHandler {
    fn collide_into(&mut self, _mover: &mut Entity, _other: &mut Entity, _d: Vec2) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    fn collide_from(&mut self, _struck: &mut Entity, _mover: &mut Entity, _d: Vec2) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_collision_skips_missing_and_disabled_entities() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut map = Map::new(1, "Arena", Vec2::new(256.0, 256.0), 32, PhysicsSettings::default(), 0)
        .unwrap()
        .with_collision_handler(CountingHandler(calls.clone()));

    let ghost = map.spawn(
        Entity::new(EntityRole::Npc, "ghost", Vec2::ZERO, Vec2::new(10.0, 10.0))
            .with_collision(false),
    );
    let solid = map.spawn(Entity::new(
        EntityRole::Npc,
        "solid",
        Vec2::new(5.0, 5.0),
        Vec2::new(10.0, 10.0),
    ));

    assert!(map.check_collisions(EntityId(999)).is_empty());
    assert!(map.check_collisions(ghost).is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let third = map.spawn(Entity::new(
        EntityRole::Npc,
        "third",
        Vec2::new(8.0, 8.0),
        Vec2::new(10.0, 10.0),
    ));
    assert_eq!(map.check_collisions(third), vec![solid]);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_message_stats_accumulate() {
    let clock = ManualClock::new(100);
    let stats = MessageStats::with_clock(Arc::new(clock.clone()));

    stats.query_executed(7, 10);
    clock.set(110);
    stats.query_executed(7, 50);
    clock.set(125);
    stats.query_executed(7, 30);

    let record = stats.get_stats(7).unwrap();
    assert_eq!(record.calls, 3);
    assert_eq!(record.total_bits, 90);
    assert_eq!(record.min_bits, 10);
    assert_eq!(record.max_bits, 50);
    assert_eq!(record.last_executed, 125);
    assert!(stats.get_stats(8).is_none());
}

#[test]
fn test_world_player_lands_moves_and_chats() {
    let clock = ManualClock::new(0);
    let mut world = GameWorld::with_clock(
        WorldSettings::default(),
        repository(),
        Arc::new(EntityFactory::with_defaults()),
        Arc::new(clock.clone()),
    );
    world.add_map(&town()).unwrap();
    let mut events = world.subscribe();

    let player = world.spawn(1, 2, Vec2::new(64.0, 300.0)).unwrap();
    assert!(matches!(
        events.try_recv().unwrap(),
        WorldEvent::EntitySpawned {
            role: EntityRole::Player,
            ..
        }
    ));

    // First update only starts the clock
    assert_eq!(world.update().steps, 0);
    for _ in 0..100 {
        clock.advance(20);
        world.update();
    }
    assert_eq!(world.steps(), 100);

    let entity = world.map(1).unwrap().entity(player).unwrap();
    assert!(entity.is_standing());
    assert!((entity.position.y + entity.size.y - 400.0).abs() < 0.5);
    let start_x = entity.position.x;

    world.queue_action(1, player, PlayerAction::MoveRight);
    world.queue_action(1, player, PlayerAction::Say("hello".into()));
    for _ in 0..10 {
        clock.advance(20);
        world.update();
    }

    let moved = world.map(1).unwrap().entity(player).unwrap();
    assert!(moved.position.x > start_x);

    let chat = std::iter::from_fn(|| events.try_recv().ok())
        .find(|event| matches!(event, WorldEvent::Chat { .. }));
    assert_eq!(
        chat,
        Some(WorldEvent::Chat {
            map: 1,
            entity: player,
            message: "hello".into()
        })
    );
}

#[test]
fn test_world_despawn_saves_player() {
    let repo = repository();
    let mut world = GameWorld::with_clock(
        WorldSettings::default(),
        repo.clone(),
        Arc::new(EntityFactory::with_defaults()),
        Arc::new(ManualClock::new(0)),
    );
    world.add_map(&town()).unwrap();

    let player = world.spawn(1, 2, Vec2::new(10.0, 10.0)).unwrap();
    world.despawn(1, player).unwrap();

    assert_eq!(repo.save_count(), 1);
    assert!(world.map(1).unwrap().entity(player).is_none());
    assert!(world.despawn(1, player).is_err());
}

async fn read_server_frame(stream: &mut TcpStream) -> ServerMessage {
    let mut header = [0u8; 2];
    stream.read_exact(&mut header).await.unwrap();
    let len = u16::from_be_bytes(header) as usize;
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await.unwrap();

    let mut payload = PacketBuffer::from_bytes(&body[1..]);
    ServerMessage::decode(body[0], &mut payload).unwrap()
}

#[tokio::test]
async fn test_tcp_round_trip() {
    let (ingress_tx, mut ingress_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, _) = broadcast::channel(1);
    let state = Arc::new(
        AppState::new(
            ServerConfig::default(),
            repository(),
            ingress_tx,
            shutdown_tx.clone(),
        )
        .unwrap(),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let acceptor_state = state.clone();
    let mut acceptor_shutdown = shutdown_tx.subscribe();
    let acceptor = tokio::spawn(async move {
        accept_connections(listener, acceptor_state, &mut acceptor_shutdown).await;
    });

    let mut client = TcpStream::connect(addr).await.unwrap();
    let wait = Duration::from_secs(5);

    let session_id = match timeout(wait, ingress_rx.recv()).await.unwrap() {
        Some(IngressEvent::Connected(id)) => id,
        other => panic!("expected Connected, got {:?}", other),
    };
    state
        .session_manager
        .get(session_id)
        .unwrap()
        .attach_entity(1, EntityId(42));

    // Ping is answered directly by the connection task
    client
        .write_all(&[0, 5, ClientMessage::Ping.id(), 0, 0, 1, 2])
        .await
        .unwrap();
    let reply = timeout(wait, read_server_frame(&mut client)).await.unwrap();
    assert_eq!(reply, ServerMessage::Pong(258));

    client
        .write_all(&[0, 1, ClientMessage::Jump.id()])
        .await
        .unwrap();
    assert_eq!(
        timeout(wait, ingress_rx.recv()).await.unwrap(),
        Some(IngressEvent::Action {
            session: session_id,
            action: PlayerAction::Jump
        })
    );

    drop(client);
    assert_eq!(
        timeout(wait, ingress_rx.recv()).await.unwrap(),
        Some(IngressEvent::Disconnected(session_id))
    );
    assert_eq!(state.session_manager.count(), 0);
    assert_eq!(state.stats.get_stats(ClientMessage::Ping.id()).unwrap().calls, 1);

    let _ = shutdown_tx.send(());
    timeout(wait, acceptor).await.unwrap().unwrap();
}
