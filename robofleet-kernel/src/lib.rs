/*
 * ROBOFLEET KERNEL - État temps réel de la flotte et propagation d'alertes
 *
 * Composants (des feuilles vers la racine) : analytics par étage, registre
 * de flotte, journal d'alertes, table des visiteurs autorisés, dispatcher
 * d'événements, et la boucle de coordination qui les pilote.
 */

pub mod actions;
pub mod alerts;
pub mod analytics;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod dispatcher;
pub mod error;
pub mod fleet;
pub mod health;
pub mod models;
pub mod visitors;

pub use coordinator::{Coordinator, DashboardView, LoopHandle};
pub use dispatcher::{Dispatcher, Event, Subscription, Topic};
pub use error::{KernelError, KernelResult};
