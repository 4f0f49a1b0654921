// ============================================================================
// outbox_relay
// ============================================================================
//
// Transactional outbox, instantiated twice:
//
//   UserService ──tx──> user_outbox_events ──relay──> Kafka (user-events)
//                                                        │
//   UserEventListener <──────────────────────────────────┘
//        │
//        └──tx──> email_outbox ──relay──> mail transport
//
// - outbox/       - record, storage ports, writer, relay (generic core)
// - storage/      - PostgreSQL and in-memory backends
// - sink/         - delivery targets (broker, mail)
// - messaging/    - Kafka producer and consumer
// - users/        - user service (event producer)
// - notification/ - email producer
// - actors/       - relay scheduling, health, supervision
// - metrics/      - Prometheus registry and HTTP endpoint
//
// ============================================================================

pub mod actors;
pub mod config;
pub mod messaging;
pub mod metrics;
pub mod models;
pub mod notification;
pub mod outbox;
pub mod sink;
pub mod storage;
pub mod users;
pub mod utils;
