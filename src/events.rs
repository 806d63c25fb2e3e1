use crate::app::ComponentState;
use crate::component::{HealthStatus, HookPhase};
use crate::error::EventBusError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Events reported while discovering, resolving and driving components
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// A descriptor was extracted from a source location
    ComponentDiscovered {
        component: String,
        location: Option<String>,
    },
    /// A source location failed to load and was skipped
    LocationSkipped { location: String, error: String },
    /// A later descriptor replaced an earlier one with the same name
    DuplicateComponent {
        component: String,
        previous: Option<String>,
        replacement: Option<String>,
    },
    /// The dependency graph was rejected before startup
    DependencyRejected { error: String },
    /// A component moved through its state machine
    StateChanged {
        component: String,
        from: ComponentState,
        to: ComponentState,
    },
    /// A hook returned an error or timed out
    HookFailed {
        component: String,
        phase: HookPhase,
        error: String,
    },
    /// A health check result differs from the previous one
    HealthChanged {
        component: String,
        from: Option<HealthStatus>,
        to: HealthStatus,
    },
    /// Shutdown was requested by a signal or by the host
    ShutdownRequested { reason: String },
}

impl LifecycleEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            LifecycleEvent::ComponentDiscovered {
                component,
                location,
            } => match location {
                Some(location) => format!("Discovered component '{}' in {}", component, location),
                None => format!("Discovered component '{}'", component),
            },
            LifecycleEvent::LocationSkipped { location, error } => {
                format!("Skipped {}: {}", location, error)
            }
            LifecycleEvent::DuplicateComponent {
                component,
                previous,
                replacement,
            } => format!(
                "Component '{}' from {} replaced by {}",
                component,
                previous.as_deref().unwrap_or("<unknown>"),
                replacement.as_deref().unwrap_or("<unknown>")
            ),
            LifecycleEvent::DependencyRejected { error } => {
                format!("Dependency graph rejected: {}", error)
            }
            LifecycleEvent::StateChanged {
                component,
                from,
                to,
            } => format!("Component '{}' {} -> {}", component, from, to),
            LifecycleEvent::HookFailed {
                component,
                phase,
                error,
            } => format!("Component '{}' {} hook failed: {}", component, phase, error),
            LifecycleEvent::HealthChanged {
                component,
                from,
                to,
            } => match from {
                Some(from) => format!("Component '{}' health {} -> {}", component, from, to),
                None => format!("Component '{}' health {}", component, to),
            },
            LifecycleEvent::ShutdownRequested { reason } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            LifecycleEvent::ComponentDiscovered { .. } => "component_discovered",
            LifecycleEvent::LocationSkipped { .. } => "location_skipped",
            LifecycleEvent::DuplicateComponent { .. } => "duplicate_component",
            LifecycleEvent::DependencyRejected { .. } => "dependency_rejected",
            LifecycleEvent::StateChanged { .. } => "state_changed",
            LifecycleEvent::HookFailed { .. } => "hook_failed",
            LifecycleEvent::HealthChanged { .. } => "health_changed",
            LifecycleEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }

    /// Component the event is about, if any
    pub fn component(&self) -> Option<&str> {
        match self {
            LifecycleEvent::ComponentDiscovered { component, .. }
            | LifecycleEvent::DuplicateComponent { component, .. }
            | LifecycleEvent::StateChanged { component, .. }
            | LifecycleEvent::HookFailed { component, .. }
            | LifecycleEvent::HealthChanged { component, .. } => Some(component),
            LifecycleEvent::LocationSkipped { .. }
            | LifecycleEvent::DependencyRejected { .. }
            | LifecycleEvent::ShutdownRequested { .. } => None,
        }
    }
}

/// An event stamped with the run that produced it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event: LifecycleEvent,
}

/// Broadcast bus through which lifecycle events are reported.
///
/// Publishing also writes the event to `tracing` at a level matching its
/// severity, so subscribers are optional.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
    run_id: Uuid,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            run_id: Uuid::new_v4(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Subscribe with a filter
    pub fn subscribe_filtered(&self, filter: EventFilter, name: impl Into<String>) -> EventReceiver {
        EventReceiver::new(self.subscribe(), filter, name.into())
    }

    /// Log the event and deliver it to every subscriber.
    ///
    /// Returns the number of subscribers reached; zero when nobody listens.
    pub fn publish(&self, event: LifecycleEvent) -> usize {
        log_event(&event);

        let envelope = EventEnvelope {
            run_id: self.run_id,
            timestamp: Utc::now(),
            event,
        };
        self.sender.send(envelope).unwrap_or(0)
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

fn log_event(event: &LifecycleEvent) {
    match event {
        LifecycleEvent::ComponentDiscovered { component, .. } => {
            debug!(component = %component, "{}", event.description());
        }
        LifecycleEvent::LocationSkipped { location, error } => {
            warn!(location = %location, error = %error, "Skipping component source");
        }
        LifecycleEvent::DuplicateComponent { component, .. } => {
            warn!(component = %component, "{}", event.description());
        }
        LifecycleEvent::DependencyRejected { error } => {
            error!(error = %error, "Dependency graph rejected");
        }
        LifecycleEvent::StateChanged { component, from, to } => {
            debug!(component = %component, from = %from, to = %to, "Component state changed");
        }
        LifecycleEvent::HookFailed {
            component,
            phase,
            error,
        } => {
            error!(component = %component, phase = %phase, error = %error, "Component hook failed");
        }
        LifecycleEvent::HealthChanged { component, to, .. } => match to {
            HealthStatus::Healthy => info!(component = %component, "{}", event.description()),
            _ => warn!(component = %component, "{}", event.description()),
        },
        LifecycleEvent::ShutdownRequested { reason } => {
            info!(reason = %reason, "Shutdown requested");
        }
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
    /// Accept events about specific components
    Components(Vec<String>),
    /// Custom filter function
    Custom(fn(&LifecycleEvent) -> bool),
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &LifecycleEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Components(components) => event
                .component()
                .map(|c| components.iter().any(|wanted| wanted == c))
                .unwrap_or(false),
            EventFilter::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<EventEnvelope>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(
        receiver: broadcast::Receiver<EventEnvelope>,
        filter: EventFilter,
        name: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next filtered event
    pub async fn recv(&mut self) -> Result<EventEnvelope, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) => {
                    if self.filter.matches(&envelope.event) {
                        return Ok(envelope);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { skipped: n });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<EventEnvelope>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(envelope) => {
                    if self.filter.matches(&envelope.event) {
                        return Ok(Some(envelope));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => {
                    return Ok(None);
                }
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { skipped: n });
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Drain every event currently queued that passes the filter.
    ///
    /// Events the receiver lagged past are lost; draining continues with the
    /// oldest event still queued.
    pub fn drain(&mut self) -> Vec<LifecycleEvent> {
        let mut events = Vec::new();
        loop {
            match self.try_recv() {
                Ok(Some(envelope)) => events.push(envelope.event),
                Ok(None) => break,
                Err(EventBusError::Lagged { .. }) => continue,
                Err(_) => break,
            }
        }
        events
    }
}
