use crate::simulation::agents::DriverAgent;
use crate::simulation::id::Id;
use crate::simulation::network::Link;
use crate::simulation::time_queue::EndTime;
use std::fmt::{Debug, Formatter};

pub struct Vehicle {
    pub id: Id<Vehicle>,
    /// Size of the vehicle in passenger car equivalents.
    pub pce: f64,
    pub curr_link: Option<Id<Link>>,
    pub link_enter_time: u32,
    /// Fractional part of this value is carried over to the next link, so that rounding of travel
    /// times does not accumulate along a route.
    pub earliest_exit_time: f64,
    driver: Box<dyn DriverAgent>,
}

impl Vehicle {
    pub fn new(id: Id<Vehicle>, pce: f64, driver: Box<dyn DriverAgent>) -> Self {
        Vehicle {
            id,
            pce,
            curr_link: None,
            link_enter_time: 0,
            earliest_exit_time: 0.,
            driver,
        }
    }

    pub fn driver(&self) -> &dyn DriverAgent {
        self.driver.as_ref()
    }

    pub fn driver_mut(&mut self) -> &mut dyn DriverAgent {
        self.driver.as_mut()
    }

    pub fn is_transit(&self) -> bool {
        self.driver.as_transit_driver().is_some()
    }

    /// The vehicle is on its destination link and does not want to move any further.
    pub fn wants_to_arrive_on(&self, link: &Id<Link>) -> bool {
        self.driver.choose_next_link_id().is_none()
            && self.driver.destination_link_id().as_ref() == Some(link)
    }
}

impl EndTime for Vehicle {
    fn end_time(&self) -> f64 {
        self.earliest_exit_time
    }
}

impl Debug for Vehicle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vehicle")
            .field("id", &self.id)
            .field("pce", &self.pce)
            .field("curr_link", &self.curr_link)
            .field("earliest_exit_time", &self.earliest_exit_time)
            .field("driver", &self.driver.id())
            .finish()
    }
}
