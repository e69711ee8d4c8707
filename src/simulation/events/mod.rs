pub mod writer;

use crate::simulation::agents::Person;
use crate::simulation::id::Id;
use crate::simulation::network::Link;
use crate::simulation::vehicles::Vehicle;
use serde::Serialize;
use std::any::Any;
use std::fmt::Debug;
use tracing::{info, instrument};

pub trait EventTrait: Debug + Any {
    //This can't be a const, because traits with const fields are not dyn compatible.
    fn type_(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
    fn time(&self) -> u32;
    /// All fields of the event including time and type as json object.
    fn to_json(&self) -> serde_json::Value;
}

macro_rules! event_trait_impl {
    ($event:ty) => {
        impl EventTrait for $event {
            fn type_(&self) -> &'static str {
                Self::TYPE
            }
            fn as_any(&self) -> &dyn Any {
                self
            }
            fn time(&self) -> u32 {
                self.time
            }
            fn to_json(&self) -> serde_json::Value {
                let mut value = serde_json::to_value(self).unwrap_or_default();
                if let Some(map) = value.as_object_mut() {
                    map.insert(String::from("type"), Self::TYPE.into());
                }
                value
            }
        }
    };
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkEnterEvent {
    pub time: u32,
    pub link: Id<Link>,
    pub vehicle: Id<Vehicle>,
    pub driver: Id<Person>,
}

impl LinkEnterEvent {
    pub const TYPE: &'static str = "entered link";
}

event_trait_impl!(LinkEnterEvent);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkLeaveEvent {
    pub time: u32,
    pub link: Id<Link>,
    pub vehicle: Id<Vehicle>,
    pub driver: Id<Person>,
}

impl LinkLeaveEvent {
    pub const TYPE: &'static str = "left link";
}

event_trait_impl!(LinkLeaveEvent);

/// A vehicle moves from the waiting list of a link into its buffer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleEntersTrafficEvent {
    pub time: u32,
    pub vehicle: Id<Vehicle>,
    pub link: Id<Link>,
    pub driver: Id<Person>,
    pub mode: Id<String>,
}

impl VehicleEntersTrafficEvent {
    pub const TYPE: &'static str = "vehicle enters traffic";
}

event_trait_impl!(VehicleEntersTrafficEvent);

/// A vehicle ends its leg on a link and is parked there.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleLeavesTrafficEvent {
    pub time: u32,
    pub vehicle: Id<Vehicle>,
    pub link: Id<Link>,
    pub driver: Id<Person>,
    pub mode: Id<String>,
}

impl VehicleLeavesTrafficEvent {
    pub const TYPE: &'static str = "vehicle leaves traffic";
}

event_trait_impl!(VehicleLeavesTrafficEvent);

/// A vehicle and its driver were removed from the network without reaching their destination.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonStuckEvent {
    pub time: u32,
    pub person: Id<Person>,
    pub link: Id<Link>,
    pub vehicle: Id<Vehicle>,
    pub mode: Id<String>,
}

impl PersonStuckEvent {
    pub const TYPE: &'static str = "stuckAndAbort";
}

event_trait_impl!(PersonStuckEvent);

/// Events emitted by links and nodes during one time step. The simulation drains the queue into
/// an [EventsPublisher] at the end of each time step.
#[derive(Debug, Default)]
pub struct EventsQueue {
    events: Vec<Box<dyn EventTrait>>,
}

impl EventsQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<E: EventTrait>(&mut self, event: E) {
        self.events.push(Box::new(event));
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn EventTrait> {
        self.events.iter().map(|e| e.as_ref())
    }

    /// All queued events of type `E` in emission order.
    pub fn of_type<E: EventTrait>(&self) -> Vec<&E> {
        self.events
            .iter()
            .filter_map(|e| e.as_any().downcast_ref::<E>())
            .collect()
    }

    /// Hands all queued events to the publisher and empties the queue.
    pub fn drain_into(&mut self, publisher: &mut EventsPublisher) {
        for event in self.events.drain(..) {
            publisher.publish_event(event.as_ref());
        }
    }
}

pub trait EventsSubscriber {
    fn receive_event(&mut self, event: &dyn EventTrait);

    fn finish(&mut self) {}

    fn as_any(&mut self) -> &mut dyn Any;
}

impl Debug for dyn EventsSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EventsSubscriber")
    }
}

pub struct EventsLogger {}

impl EventsSubscriber for EventsLogger {
    fn receive_event(&mut self, event: &dyn EventTrait) {
        info!("{}: {event:?}", event.time());
    }

    fn as_any(&mut self) -> &mut dyn Any {
        self
    }
}

/// Keeps all events in memory. Mostly useful for tests.
#[derive(Debug, Default)]
pub struct EventsCollector {
    pub events: Vec<serde_json::Value>,
}

impl EventsCollector {
    pub fn of_type(&self, type_: &str) -> Vec<&serde_json::Value> {
        self.events
            .iter()
            .filter(|e| e["type"].as_str() == Some(type_))
            .collect()
    }
}

impl EventsSubscriber for EventsCollector {
    fn receive_event(&mut self, event: &dyn EventTrait) {
        self.events.push(event.to_json());
    }

    fn as_any(&mut self) -> &mut dyn Any {
        self
    }
}

/// EventsPublisher owns event handlers. Handlers are Trait objects, hence they have to be passed in a
/// Box. On publish_event all handler's receive_event methods are called.
#[derive(Default, Debug)]
pub struct EventsPublisher {
    handlers: Vec<Box<dyn EventsSubscriber>>,
}

impl EventsPublisher {
    pub fn new() -> Self {
        EventsPublisher {
            handlers: Vec::new(),
        }
    }

    pub fn add_subscriber(&mut self, handler: Box<dyn EventsSubscriber>) {
        self.handlers.push(handler);
    }

    pub fn publish_event(&mut self, event: &dyn EventTrait) {
        for handler in self.handlers.iter_mut() {
            handler.receive_event(event);
        }
    }

    #[instrument(skip_all, level = "trace")]
    pub fn finish(&mut self) {
        for handler in self.handlers.iter_mut() {
            handler.finish();
        }
    }

    pub fn get_subscriber<T: EventsSubscriber + 'static>(&mut self) -> Option<&mut T> {
        let mut result = None;
        for handler in self.handlers.iter_mut() {
            if let Some(collector) = handler.as_any().downcast_mut::<T>() {
                result = Some(collector)
            };
        }
        result
    }
}
