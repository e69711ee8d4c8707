use crate::simulation::config;
use crate::simulation::error::SimError;
use crate::simulation::events::{
    EventsQueue, LinkEnterEvent, LinkLeaveEvent, PersonStuckEvent, VehicleEntersTrafficEvent,
    VehicleLeavesTrafficEvent,
};
use crate::simulation::id::Id;
use crate::simulation::network::flow_cap::Flowcap;
use crate::simulation::network::holes::Holes;
use crate::simulation::network::signals::{SignalGroupState, SignalizedItem};
use crate::simulation::network::storage_cap::{StorageCap, StorageGeometry};
use crate::simulation::network::stuck_timer::StuckTimer;
use crate::simulation::network::warnings::CapacityWarnings;
use crate::simulation::network::{Link, NetworkChangeEvent, Node};
use crate::simulation::time_queue::TimeQueue;
use crate::simulation::vehicles::Vehicle;
use nohash_hasher::IntMap;
use std::collections::VecDeque;
use tracing::debug;

/// A link during the simulation.
///
/// Vehicles entering from upstream are placed into the queue `q`, where they stay for the free
/// flow travel time. Afterwards, they move into the `buffer` as the flow capacity permits. The to
/// node takes vehicles from the buffer and moves them onto their next link. Vehicles starting a
/// leg on this link are placed into the `waiting_list` and enter the buffer directly.
#[derive(Debug)]
pub struct SimLink {
    pub id: Id<Link>,
    pub from: Id<Node>,
    pub to: Id<Node>,
    length: f64,
    effective_cell_size: f64,
    // attributes from the network file. Network change events with factors refer to these.
    base_freespeed: f64,
    base_lanes: f64,
    base_capacity_h: f64,
    freespeed: f64,
    lanes: f64,
    capacity_h: f64,
    free_flow_travel_time: f64,
    q: VecDeque<Vehicle>,
    buffer: VecDeque<Vehicle>,
    waiting_list: VecDeque<Vehicle>,
    transit_stop_queue: TimeQueue<Vehicle>,
    parked: IntMap<Id<Vehicle>, Vehicle>,
    flow_cap: Flowcap,
    storage_cap: StorageCap,
    holes: Option<Holes>,
    signal: Option<SignalizedItem>,
    stuck_timer: StuckTimer,
}

impl SimLink {
    pub fn from_link(
        link: &Link,
        effective_cell_size: f64,
        config: &config::Simulation,
        warnings: &mut CapacityWarnings,
    ) -> Self {
        let holes = config
            .holes
            .enabled
            .then(|| Holes::new(&link.id, link.length, config));

        let mut sim_link = SimLink {
            id: link.id.clone(),
            from: link.from.clone(),
            to: link.to.clone(),
            length: link.length,
            effective_cell_size,
            base_freespeed: link.freespeed,
            base_lanes: link.permlanes,
            base_capacity_h: link.capacity,
            freespeed: link.freespeed,
            lanes: link.permlanes,
            capacity_h: link.capacity,
            free_flow_travel_time: link.length / link.freespeed,
            q: VecDeque::new(),
            buffer: VecDeque::new(),
            waiting_list: VecDeque::new(),
            transit_stop_queue: TimeQueue::new(),
            parked: IntMap::default(),
            flow_cap: Flowcap::new(link.capacity, config.time_step, config.flow_capacity_factor),
            storage_cap: StorageCap::new(0.),
            holes,
            signal: None,
            stuck_timer: StuckTimer::new(config.stuck_threshold),
        };
        sim_link.recalc_capacities(config.start_time, config, warnings);
        sim_link
    }

    /// Places a vehicle coming from the upstream node at the end of the queue.
    pub fn add_from_upstream(&mut self, mut vehicle: Vehicle, now: u32, events: &mut EventsQueue) {
        // keep the fractional travel time of the previous link, so that rounding errors do not add up
        let carry_over = vehicle.earliest_exit_time - vehicle.earliest_exit_time.floor();
        vehicle.earliest_exit_time =
            (now as f64 + self.free_flow_travel_time + carry_over).floor();
        vehicle.link_enter_time = now;
        vehicle.curr_link = Some(self.id.clone());

        self.storage_cap.consume(vehicle.pce);
        events.push(LinkEnterEvent {
            time: now,
            link: self.id.clone(),
            vehicle: vehicle.id.clone(),
            driver: vehicle.driver().id().clone(),
        });
        if let Some(holes) = &mut self.holes {
            holes.consume();
        }
        self.q.push_back(vehicle);
    }

    /// Places a vehicle which starts its leg on this link into the waiting list.
    pub fn add_departing(&mut self, mut vehicle: Vehicle) {
        vehicle.curr_link = Some(self.id.clone());
        self.waiting_list.push_back(vehicle);
    }

    /// Moves vehicles into the buffer as far as flow capacity permits.
    ///
    /// Returns the ids of the vehicles which arrived on this link during this step. They are parked
    /// on the link afterwards.
    pub fn do_sim_step(&mut self, now: u32, events: &mut EventsQueue) -> Vec<Id<Vehicle>> {
        let is_green = self.is_green();
        self.flow_cap.refill(is_green);

        let mut arrived = Vec::new();
        self.move_transit_to_queue(now);
        self.move_queue_to_buffer(now, events, &mut arrived);
        self.move_waiting_to_buffer(now, events, &mut arrived);
        arrived
    }

    /// Transit vehicles which finished dwelling re-enter the queue at its front. Vehicles released in
    /// the same step keep their order.
    fn move_transit_to_queue(&mut self, now: u32) {
        let released = self.transit_stop_queue.pop_all_due(now as f64);
        for vehicle in released.into_iter().rev() {
            self.q.push_front(vehicle);
        }
    }

    fn move_queue_to_buffer(
        &mut self,
        now: u32,
        events: &mut EventsQueue,
        arrived: &mut Vec<Id<Vehicle>>,
    ) {
        while let Some(vehicle) = self.q.front() {
            if vehicle.earliest_exit_time > now as f64 {
                break;
            }

            // start over. The vehicle either dwells, left the queue or has served its stop
            if self.handle_transit_stop(now) {
                continue;
            }

            let Some(vehicle) = self.q.front() else {
                break;
            };
            if vehicle.wants_to_arrive_on(&self.id) {
                let vehicle = self.pop_from_queue(now, false);
                self.arrive(vehicle, now, events, arrived);
                continue;
            }

            // head of line blocking: no vehicle passes the first one, which does not fit
            if !self.has_buffer_space() {
                break;
            }

            if self.is_one_link_transit(vehicle) {
                let vehicle = self.pop_from_queue(now, false);
                self.arrive(vehicle, now, events, arrived);
                continue;
            }

            let vehicle = self.pop_from_queue(now, true);
            self.add_to_buffer(vehicle, now);
        }
    }

    fn move_waiting_to_buffer(
        &mut self,
        now: u32,
        events: &mut EventsQueue,
        arrived: &mut Vec<Id<Vehicle>>,
    ) {
        while let Some(vehicle) = self.waiting_list.front() {
            // legs which end on their departure link do not need the buffer
            if !vehicle.wants_to_arrive_on(&self.id) && !self.has_buffer_space() {
                break;
            }
            let Some(vehicle) = self.waiting_list.pop_front() else {
                break;
            };

            events.push(VehicleEntersTrafficEvent {
                time: now,
                vehicle: vehicle.id.clone(),
                link: self.id.clone(),
                driver: vehicle.driver().id().clone(),
                mode: vehicle.driver().mode().clone(),
            });

            let Some(vehicle) = self.stop_waiting_transit(vehicle, now) else {
                continue;
            };

            if vehicle.wants_to_arrive_on(&self.id) || self.is_one_link_transit(&vehicle) {
                self.arrive(vehicle, now, events, arrived);
                continue;
            }

            self.add_to_buffer(vehicle, now);
        }
    }

    /// Serves the next stop of the transit vehicle at the head of the queue, if that stop is on
    /// this link. Returns true if a stop was handled.
    fn handle_transit_stop(&mut self, now: u32) -> bool {
        let Some(vehicle) = self.q.front_mut() else {
            return false;
        };
        let Some(driver) = vehicle.driver_mut().as_transit_driver_mut() else {
            return false;
        };
        let Some(stop) = driver
            .next_transit_stop()
            .filter(|stop| stop.link == self.id)
            .cloned()
        else {
            return false;
        };

        let delay = driver.handle_transit_stop(&stop, now);
        if delay > 0. {
            vehicle.earliest_exit_time = now as f64 + delay;
            // vehicles at blocking stops stay in the queue and block all following vehicles
            if !stop.is_blocking_lane {
                if let Some(vehicle) = self.q.pop_front() {
                    self.transit_stop_queue.add(vehicle);
                }
            }
        }
        true
    }

    /// Serves all stops on this link of a transit vehicle leaving the waiting list. Vehicles which
    /// have to dwell go into the transit stop queue, which never blocks other vehicles. Returns the
    /// vehicle if it can continue.
    fn stop_waiting_transit(&mut self, mut vehicle: Vehicle, now: u32) -> Option<Vehicle> {
        let Some(driver) = vehicle.driver_mut().as_transit_driver_mut() else {
            return Some(vehicle);
        };

        while let Some(stop) = driver
            .next_transit_stop()
            .filter(|stop| stop.link == self.id)
            .cloned()
        {
            let delay = driver.handle_transit_stop(&stop, now);
            if delay > 0. {
                vehicle.earliest_exit_time = now as f64 + delay;
                // the vehicle will pass through the queue, which releases storage and emits a hole
                self.storage_cap.consume(vehicle.pce);
                if let Some(holes) = &mut self.holes {
                    holes.consume();
                }
                self.transit_stop_queue.add(vehicle);
                return None;
            }
        }
        Some(vehicle)
    }

    /// Transit routes may consist of a single link, so that the vehicle can serve the stops on it.
    /// Such vehicles arrive without moving through the buffer.
    fn is_one_link_transit(&self, vehicle: &Vehicle) -> bool {
        if !vehicle.is_transit() {
            return false;
        }
        match vehicle.driver().choose_next_link_id() {
            None => true,
            Some(next) => next == self.id,
        }
    }

    fn pop_from_queue(&mut self, now: u32, into_buffer: bool) -> Vehicle {
        let vehicle = self
            .q
            .pop_front()
            .unwrap_or_else(|| panic!("Queue of link {} is empty.", self.id));
        self.storage_cap.release(vehicle.pce);
        if let Some(holes) = &mut self.holes {
            if into_buffer {
                holes.emit_with_jitter(now);
            } else {
                holes.emit(now);
            }
        }
        vehicle
    }

    fn arrive(
        &mut self,
        vehicle: Vehicle,
        now: u32,
        events: &mut EventsQueue,
        arrived: &mut Vec<Id<Vehicle>>,
    ) {
        events.push(VehicleLeavesTrafficEvent {
            time: now,
            vehicle: vehicle.id.clone(),
            link: self.id.clone(),
            driver: vehicle.driver().id().clone(),
            mode: vehicle.driver().mode().clone(),
        });
        arrived.push(vehicle.id.clone());
        self.add_parked_vehicle(vehicle);
    }

    fn has_buffer_space(&self) -> bool {
        self.buffer.len() < self.flow_cap.buffer_storage_capacity()
            && self.flow_cap.has_capacity_left()
    }

    fn add_to_buffer(&mut self, vehicle: Vehicle, now: u32) {
        if !self.flow_cap.consume() {
            panic!("Buffer of link {} has no space left!", self.id);
        }
        self.buffer.push_back(vehicle);
        if self.buffer.len() == 1 {
            self.stuck_timer.reset(now);
        }
    }

    /// Removes the first vehicle from the buffer. Called by the to node, when the vehicle moves on.
    pub fn pop_veh(&mut self, now: u32, events: &mut EventsQueue) -> Option<Vehicle> {
        let vehicle = self.buffer.pop_front()?;
        // the next vehicle in the buffer starts waiting now
        self.stuck_timer.reset(now);
        events.push(LinkLeaveEvent {
            time: now,
            link: self.id.clone(),
            vehicle: vehicle.id.clone(),
            driver: vehicle.driver().id().clone(),
        });
        Some(vehicle)
    }

    /// The first vehicle of the buffer.
    pub fn offers_veh(&self) -> Option<&Vehicle> {
        self.buffer.front()
    }

    /// Whether a vehicle from upstream may enter the link. With holes, free storage is not enough:
    /// the space left by a previous vehicle must also have travelled back to the upstream end.
    pub fn has_space(&self, now: u32) -> bool {
        if !self.storage_cap.is_available() {
            return false;
        }
        match &self.holes {
            Some(holes) => holes.is_available(now),
            None => true,
        }
    }

    pub fn is_veh_stuck(&self, now: u32) -> bool {
        self.stuck_timer.is_stuck(now)
    }

    /// When the buffer moved last. The head of the buffer waits since then.
    pub fn buffer_last_moved(&self) -> Option<u32> {
        self.stuck_timer.last_moved()
    }

    /// The link needs further simulation steps, either because it holds vehicles which do not sit
    /// in the buffer, or because it has not banked a full unit of flow capacity yet.
    pub fn is_active(&self) -> bool {
        self.is_accumulating()
            || !self.q.is_empty()
            || !self.waiting_list.is_empty()
            || !self.transit_stop_queue.is_empty()
    }

    fn is_accumulating(&self) -> bool {
        self.flow_cap.fraction() > 0. && self.flow_cap.accumulated() < 1.
    }

    /// Changes the link attributes. An event which would leave the link with invalid attributes is
    /// rejected and the link keeps its previous values.
    pub fn apply_change_event(&mut self, event: &NetworkChangeEvent) -> Result<(), SimError> {
        let freespeed = event
            .freespeed
            .map_or(self.freespeed, |c| c.apply(self.base_freespeed));
        let lanes = event.lanes.map_or(self.lanes, |c| c.apply(self.base_lanes));
        let capacity_h = event
            .flow_capacity
            .map_or(self.capacity_h, |c| c.apply(self.base_capacity_h));
        Link::validate_attributes(&self.id, self.length, freespeed, capacity_h, lanes)?;

        self.freespeed = freespeed;
        self.lanes = lanes;
        self.capacity_h = capacity_h;
        Ok(())
    }

    /// Computes flow and storage capacity from the current link attributes. Calling this again
    /// with unchanged attributes yields the same capacities.
    pub fn recalc_capacities(
        &mut self,
        now: u32,
        config: &config::Simulation,
        warnings: &mut CapacityWarnings,
    ) {
        self.free_flow_travel_time = self.length / self.freespeed;
        self.flow_cap.recalculate(
            self.capacity_h,
            config.time_step,
            config.flow_capacity_factor,
        );

        let geometry = StorageGeometry {
            length: self.length,
            lanes: self.lanes,
            effective_cell_size: self.effective_cell_size,
            storage_capacity_factor: config.storage_capacity_factor,
            flow_cap_per_time_step: self.flow_cap.capacity_per_time_step(),
            free_flow_travel_time: self.free_flow_travel_time,
        };
        let mut storage = StorageCap::calculate(&self.id, &geometry, warnings);
        if let Some(holes) = &mut self.holes {
            storage = holes.update_capacity(
                &self.id,
                self.length,
                storage,
                self.base_capacity_h / 3600.,
                &config.holes,
                warnings,
            );
        }
        self.storage_cap.set_max(storage);
        debug!(
            "{now}: capacities of link {}: flow cap: {}, storage cap: {storage}",
            self.id,
            self.flow_cap.capacity_per_time_step()
        );
    }

    /// Removes all vehicles which are in traffic and reports them as stuck. Parked vehicles are
    /// dropped without an event.
    pub fn clear_vehicles(&mut self, now: u32, events: &mut EventsQueue) -> Vec<Vehicle> {
        let mut cleared: Vec<Vehicle> = self.waiting_list.drain(..).collect();
        cleared.extend(self.q.drain(..));
        cleared.extend(self.buffer.drain(..));
        cleared.extend(self.transit_stop_queue.drain_sorted());
        self.parked.clear();

        for vehicle in &cleared {
            events.push(PersonStuckEvent {
                time: now,
                person: vehicle.driver().id().clone(),
                link: self.id.clone(),
                vehicle: vehicle.id.clone(),
                mode: vehicle.driver().mode().clone(),
            });
        }
        self.storage_cap = StorageCap::new(self.storage_cap.max());
        cleared
    }

    pub fn add_parked_vehicle(&mut self, mut vehicle: Vehicle) {
        vehicle.curr_link = Some(self.id.clone());
        self.parked.insert(vehicle.id.clone(), vehicle);
    }

    pub fn remove_parked_vehicle(&mut self, id: &Id<Vehicle>) -> Result<Vehicle, SimError> {
        self.parked
            .remove(id)
            .ok_or_else(|| SimError::VehicleNotParked {
                vehicle: id.external().to_string(),
                link: self.id.external().to_string(),
            })
    }

    pub fn parked_vehicle_mut(&mut self, id: &Id<Vehicle>) -> Option<&mut Vehicle> {
        self.parked.get_mut(id)
    }

    pub fn get_vehicle(&self, id: &Id<Vehicle>) -> Option<&Vehicle> {
        self.parked
            .get(id)
            .or_else(|| self.all_non_parked_vehicles().find(|v| &v.id == id))
    }

    pub fn all_vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.parked.values().chain(self.all_non_parked_vehicles())
    }

    pub fn all_non_parked_vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.transit_stop_queue
            .iter()
            .chain(self.waiting_list.iter())
            .chain(self.q.iter())
            .chain(self.buffer.iter())
    }

    pub fn set_signalized(&mut self, to_links: &[Id<Link>]) {
        self.signal = Some(SignalizedItem::new(to_links));
    }

    pub fn set_signal_state_all_turning_moves(
        &mut self,
        state: SignalGroupState,
    ) -> Result<(), SimError> {
        let signal = self
            .signal
            .as_mut()
            .ok_or_else(|| SimError::NotSignalized(self.id.external().to_string()))?;
        signal.set_all_turning_moves(state);
        Ok(())
    }

    pub fn set_signal_state_for_turning_move(
        &mut self,
        state: SignalGroupState,
        to_link: &Id<Link>,
    ) -> Result<(), SimError> {
        let signal = self
            .signal
            .as_mut()
            .ok_or_else(|| SimError::NotSignalized(self.id.external().to_string()))?;
        signal.set_turning_move(&self.id, to_link, state)
    }

    /// Links without signal are always green.
    pub fn has_green_for_to_link(&self, to_link: &Id<Link>) -> bool {
        match &self.signal {
            Some(signal) => signal.is_green_for(to_link),
            None => true,
        }
    }

    fn is_green(&self) -> bool {
        match &self.signal {
            Some(signal) => signal.is_link_green(),
            None => true,
        }
    }

    pub fn flow_cap(&self) -> &Flowcap {
        &self.flow_cap
    }

    pub fn storage_capacity(&self) -> f64 {
        self.storage_cap.max()
    }

    pub fn used_storage(&self) -> f64 {
        self.storage_cap.used()
    }

    pub fn free_flow_travel_time(&self) -> f64 {
        self.free_flow_travel_time
    }

    pub fn holes(&self) -> Option<&Holes> {
        self.holes.as_ref()
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn q_len(&self) -> usize {
        self.q.len()
    }

    pub fn waiting_len(&self) -> usize {
        self.waiting_list.len()
    }

    pub fn transit_stop_len(&self) -> usize {
        self.transit_stop_queue.len()
    }

    pub fn parked_len(&self) -> usize {
        self.parked.len()
    }

    /// Number of vehicles in traffic on this link.
    pub fn veh_count(&self) -> usize {
        self.q.len() + self.buffer.len() + self.waiting_list.len() + self.transit_stop_queue.len()
    }
}

#[cfg(test)]
mod sim_link_tests {
    use crate::simulation::agents::transit_driver::TransitStop;
    use crate::simulation::config;
    use crate::simulation::events::{
        EventsQueue, LinkEnterEvent, LinkLeaveEvent, PersonStuckEvent, VehicleEntersTrafficEvent,
        VehicleLeavesTrafficEvent,
    };
    use crate::simulation::id::Id;
    use crate::simulation::network::link::SimLink;
    use crate::simulation::network::signals::SignalGroupState;
    use crate::simulation::network::warnings::CapacityWarnings;
    use crate::simulation::network::{ChangeValue, Link, NetworkChangeEvent};
    use crate::test_utils;
    use crate::test_utils::{create_transit_vehicle, create_vehicle, transit_stop};
    use assert_approx_eq::assert_approx_eq;
    use macros::integration_test;

    fn test_link(capacity: f64, freespeed: f64, lanes: f64, length: f64) -> Link {
        Link {
            id: Id::create("link"),
            from: Id::create("from"),
            to: Id::create("to"),
            length,
            capacity,
            freespeed,
            permlanes: lanes,
        }
    }

    fn sim_link(link: &Link, config: &config::Simulation) -> SimLink {
        SimLink::from_link(link, 7.5, config, &mut CapacityWarnings::new())
    }

    /// Moves vehicles until nothing is left in the queue. Returns the times at which vehicles
    /// entered the buffer, popping them immediately.
    fn times_into_buffer(link: &mut SimLink, from: u32, to: u32) -> Vec<(u32, String)> {
        let mut events = EventsQueue::new();
        let mut result = Vec::new();
        for now in from..to {
            link.do_sim_step(now, &mut events);
            while let Some(vehicle) = link.pop_veh(now, &mut events) {
                result.push((now, vehicle.id.external().to_string()));
            }
        }
        result
    }

    #[integration_test]
    fn storage_cap_consumed() {
        let mut link = sim_link(&test_link(3600., 10., 3., 100.), &test_utils::config());
        let mut vehicle = create_vehicle("1", &["link", "next"]);
        vehicle.pce = 1.5;

        link.add_from_upstream(vehicle, 0, &mut EventsQueue::new());

        // storage capacity should be consumed immediately.
        assert_approx_eq!(1.5, link.used_storage());
    }

    #[integration_test]
    fn storage_cap_released() {
        let mut link = sim_link(&test_link(3600., 10., 3., 10.), &test_utils::config());
        let mut vehicle = create_vehicle("1", &["link", "next"]);
        vehicle.pce = 1.5;
        let mut events = EventsQueue::new();

        link.add_from_upstream(vehicle, 0, &mut events);
        assert_approx_eq!(1.5, link.used_storage());

        link.do_sim_step(1, &mut events);
        // the vehicle is in the buffer, which does not count towards the storage
        assert_approx_eq!(0., link.used_storage());
        assert!(link.pop_veh(1, &mut events).is_some());
        assert_approx_eq!(0., link.used_storage());
    }

    #[integration_test]
    fn link_enter_and_leave_events() {
        let mut link = sim_link(&test_link(3600., 10., 3., 10.), &test_utils::config());
        let mut events = EventsQueue::new();

        link.add_from_upstream(create_vehicle("1", &["link", "next"]), 0, &mut events);
        link.do_sim_step(1, &mut events);
        link.pop_veh(1, &mut events);

        let enter = events.of_type::<LinkEnterEvent>();
        assert_eq!(1, enter.len());
        assert_eq!(0, enter[0].time);
        let leave = events.of_type::<LinkLeaveEvent>();
        assert_eq!(1, leave.len());
        assert_eq!(1, leave[0].time);
        assert_eq!("link", leave[0].link.external());
        // the driver of test vehicles has the vehicle's id
        assert_eq!("1", enter[0].driver.external());
        assert_eq!("1", leave[0].driver.external());
    }

    #[integration_test]
    fn calculates_exit_time() {
        let mut link = sim_link(&test_link(3600., 10., 3., 100.), &test_utils::config());
        let mut events = EventsQueue::new();
        link.add_from_upstream(create_vehicle("1", &["link", "next"]), 0, &mut events);

        for now in 0..10 {
            link.do_sim_step(now, &mut events);
            assert!(link.offers_veh().is_none());
        }

        link.do_sim_step(10, &mut events);
        assert!(link.offers_veh().is_some());
    }

    #[integration_test]
    fn exit_time_carries_fraction() {
        // 100m at 3m/s take 33.33s
        let mut link = sim_link(&test_link(3600., 3., 3., 100.), &test_utils::config());
        let mut events = EventsQueue::new();
        let mut vehicle = create_vehicle("1", &["link", "next"]);
        vehicle.earliest_exit_time = 12.8;

        link.add_from_upstream(vehicle, 20, &mut events);
        link.do_sim_step(20, &mut events);
        let vehicle = link.get_vehicle(&Id::get_from_ext("1")).unwrap();
        // floor(20 + 33.33 + 0.8)
        assert_approx_eq!(54., vehicle.earliest_exit_time);
        assert_eq!(20, vehicle.link_enter_time);
    }

    #[integration_test]
    fn flow_cap_accumulates() {
        // 0.25 veh/s
        let mut link = sim_link(&test_link(900., 10., 3., 100.), &test_utils::config());
        let mut events = EventsQueue::new();
        link.add_from_upstream(create_vehicle("1", &["link", "next"]), 0, &mut events);
        link.add_from_upstream(create_vehicle("2", &["link", "next"]), 0, &mut events);

        let times = times_into_buffer(&mut link, 0, 40);

        // the first vehicle uses the initially banked capacity. The second one has to wait until
        // another full vehicle has accumulated.
        assert_eq!(
            vec![(10, String::from("1")), (14, String::from("2"))],
            times
        );
    }

    #[integration_test]
    fn single_link_scenario() {
        // 1 veh/s and 10s travel time. 37.5m with one lane are enlarged from 5 to 10 veh
        let mut link = sim_link(&test_link(3600., 3.75, 1., 37.5), &test_utils::config());
        assert_approx_eq!(10., link.free_flow_travel_time());
        assert_approx_eq!(10., link.storage_capacity());

        let mut link = sim_link(&test_link(3600., 10., 1., 100.), &test_utils::config());
        let mut events = EventsQueue::new();
        for id in ["1", "2", "3"] {
            link.add_from_upstream(create_vehicle(id, &["link", "next"]), 0, &mut events);
        }

        let mut buffered = Vec::new();
        for now in 0..20 {
            link.do_sim_step(now, &mut events);
            if let Some(vehicle) = link.offers_veh() {
                buffered.push((now, vehicle.id.external().to_string()));
                // buffer holds at most ceil(1) vehicles
                assert_eq!(1, link.buffer_len());
                link.pop_veh(now, &mut events);
            }
        }
        assert_eq!(
            vec![
                (10, String::from("1")),
                (11, String::from("2")),
                (12, String::from("3"))
            ],
            buffered
        );
    }

    #[integration_test]
    fn blocked_buffer_holds_queue() {
        let mut link = sim_link(&test_link(3600., 10., 1., 100.), &test_utils::config());
        let mut events = EventsQueue::new();
        for id in ["1", "2", "3"] {
            link.add_from_upstream(create_vehicle(id, &["link", "next"]), 0, &mut events);
        }

        // nobody takes vehicles out of the buffer
        for now in 0..20 {
            link.do_sim_step(now, &mut events);
            assert!(link.buffer_len() <= 1);
        }
        assert_eq!(1, link.buffer_len());
        assert_eq!(2, link.q_len());
        assert_eq!("1", link.offers_veh().unwrap().id.external());
    }

    #[integration_test]
    fn fifo_ordering() {
        // 0.125 veh/s
        let mut link = sim_link(&test_link(450., 1., 1., 15.), &test_utils::config());
        let mut events = EventsQueue::new();

        link.add_from_upstream(create_vehicle("42", &["link", "next"]), 0, &mut events);
        assert_approx_eq!(1., link.used_storage());
        link.add_from_upstream(create_vehicle("43", &["link", "next"]), 0, &mut events);
        assert_approx_eq!(2., link.used_storage());

        link.do_sim_step(15, &mut events);
        let popped_vehicle1 = link.pop_veh(15, &mut events).unwrap();
        assert_eq!("42", popped_vehicle1.id.external());

        for now in 16..23 {
            link.do_sim_step(now, &mut events);
            assert!(link.pop_veh(now, &mut events).is_none());
        }

        link.do_sim_step(23, &mut events);
        let popped_vehicle2 = link.pop_veh(23, &mut events).unwrap();
        assert_eq!("43", popped_vehicle2.id.external());
    }

    #[integration_test]
    fn long_run_flow() {
        // 0.3 veh/s
        let mut link = sim_link(&test_link(1080., 10., 1., 10.), &test_utils::config());
        let mut events = EventsQueue::new();
        for i in 0..400 {
            link.add_from_upstream(
                create_vehicle(&i.to_string(), &["link", "next"]),
                0,
                &mut events,
            );
        }

        let times = times_into_buffer(&mut link, 0, 1001);
        // the first vehicle leaves at t=1 with the initially banked capacity
        let in_first_1000s = times.iter().filter(|(t, _)| *t <= 1000).count();
        assert!((299..=301).contains(&in_first_1000s), "{in_first_1000s}");

        // FIFO
        let ids: Vec<usize> = times.iter().map(|(_, id)| id.parse().unwrap()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(sorted, ids);
    }

    #[integration_test]
    fn departure_round_trip() {
        let mut link = sim_link(&test_link(3600., 10., 1., 100.), &test_utils::config());
        let mut events = EventsQueue::new();
        link.add_departing(create_vehicle("1", &["link", "next"]));
        assert!(link.is_active());

        link.do_sim_step(0, &mut events);
        assert_eq!(1, events.of_type::<VehicleEntersTrafficEvent>().len());
        let vehicle = link.pop_veh(0, &mut events).unwrap();
        assert_eq!("1", vehicle.id.external());
        assert_eq!(Some(Id::get_from_ext("link")), vehicle.curr_link);
    }

    #[integration_test]
    fn single_link_leg_arrives_from_waiting_list() {
        let mut link = sim_link(&test_link(3600., 10., 1., 100.), &test_utils::config());
        let mut events = EventsQueue::new();
        link.add_departing(create_vehicle("1", &["link", "next"]));
        link.add_departing(create_vehicle("2", &["link"]));
        link.add_departing(create_vehicle("3", &["link", "next"]));

        let arrived = link.do_sim_step(0, &mut events);

        // "1" uses the only buffer slot. "2" arrives without it, "3" has to wait
        assert_eq!(vec![Id::get_from_ext("2")], arrived);
        assert_eq!(1, link.buffer_len());
        assert_eq!(1, link.waiting_len());
        assert_eq!(1, link.parked_len());
        assert_approx_eq!(0., link.used_storage());
        assert_eq!(2, events.of_type::<VehicleEntersTrafficEvent>().len());
        let arrival = events.of_type::<VehicleLeavesTrafficEvent>();
        assert_eq!(1, arrival.len());
        assert_eq!(0, arrival[0].time);
    }

    #[integration_test]
    fn arrival_parks_vehicle() {
        let mut link = sim_link(&test_link(3600., 10., 1., 100.), &test_utils::config());
        let mut events = EventsQueue::new();
        link.add_from_upstream(create_vehicle("1", &["link"]), 0, &mut events);

        let arrived = link.do_sim_step(10, &mut events);

        assert_eq!(vec![Id::get_from_ext("1")], arrived);
        assert_eq!(1, link.parked_len());
        assert_eq!(0, link.buffer_len());
        assert_approx_eq!(0., link.used_storage());
        assert_eq!(1, events.of_type::<VehicleLeavesTrafficEvent>().len());
        assert!(link.remove_parked_vehicle(&Id::get_from_ext("1")).is_ok());
        assert!(link.remove_parked_vehicle(&Id::get_from_ext("1")).is_err());
    }

    #[integration_test]
    fn non_blocking_transit_stop() {
        let mut link = sim_link(&test_link(3600., 10., 1., 100.), &test_utils::config());
        let mut events = EventsQueue::new();
        let stop = transit_stop("stop", "link", false);
        let bus = create_transit_vehicle(
            "bus",
            &["link", "next"],
            vec![TransitStop {
                facility: stop,
                dwell_time: 30,
            }],
        );
        link.add_from_upstream(bus, 0, &mut events);
        link.add_from_upstream(create_vehicle("car", &["link", "next"]), 0, &mut events);

        let times = times_into_buffer(&mut link, 0, 60);
        // the car passes the dwelling bus, which leaves after 30s
        assert_eq!(
            vec![(10, String::from("car")), (40, String::from("bus"))],
            times
        );
    }

    #[integration_test]
    fn blocking_transit_stop() {
        let mut link = sim_link(&test_link(3600., 10., 1., 100.), &test_utils::config());
        let mut events = EventsQueue::new();
        let stop = transit_stop("stop", "link", true);
        let bus = create_transit_vehicle(
            "bus",
            &["link", "next"],
            vec![TransitStop {
                facility: stop,
                dwell_time: 30,
            }],
        );
        link.add_from_upstream(bus, 0, &mut events);
        link.add_from_upstream(create_vehicle("car", &["link", "next"]), 0, &mut events);

        let times = times_into_buffer(&mut link, 0, 60);
        // the bus blocks the car until it has finished dwelling
        assert_eq!(
            vec![(40, String::from("bus")), (41, String::from("car"))],
            times
        );
    }

    #[integration_test]
    fn waiting_transit_dwells_without_blocking() {
        let mut link = sim_link(&test_link(3600., 10., 1., 100.), &test_utils::config());
        let mut events = EventsQueue::new();
        let stop = transit_stop("stop", "link", false);
        let bus = create_transit_vehicle(
            "bus",
            &["link", "next"],
            vec![TransitStop {
                facility: stop,
                dwell_time: 20,
            }],
        );
        link.add_departing(bus);
        link.add_departing(create_vehicle("car", &["link", "next"]));

        let times = times_into_buffer(&mut link, 0, 30);
        assert_eq!(
            vec![(0, String::from("car")), (20, String::from("bus"))],
            times
        );
        assert_approx_eq!(0., link.used_storage());
    }

    #[integration_test]
    fn departing_transit_keeps_holes() {
        let config = config::Simulation {
            holes: config::Holes {
                enabled: true,
                ..Default::default()
            },
            ..test_utils::config()
        };
        let mut link = sim_link(&test_link(360., 10., 1., 100.), &config);
        let max_holes = link.holes().unwrap().max_holes();
        assert_eq!(11, max_holes);

        let stop = transit_stop("stop", "link", false);
        for i in 0..5 {
            let bus = create_transit_vehicle(
                &format!("bus-{i}"),
                &["link", "next"],
                vec![TransitStop {
                    facility: stop.clone(),
                    dwell_time: 5,
                }],
            );
            link.add_departing(bus);
        }

        let mut events = EventsQueue::new();
        let mut left = 0;
        for now in 0..200 {
            link.do_sim_step(now, &mut events);
            while link.pop_veh(now, &mut events).is_some() {
                left += 1;
            }
            let holes = link.holes().unwrap().len();
            assert!(holes <= max_holes, "{holes} holes at {now}");
        }

        assert_eq!(5, left);
        assert_eq!(max_holes, link.holes().unwrap().len());
        assert_approx_eq!(0., link.used_storage());
    }

    #[integration_test]
    fn one_link_transit_route_arrives() {
        let mut link = sim_link(&test_link(3600., 10., 1., 100.), &test_utils::config());
        let mut events = EventsQueue::new();
        let bus = create_transit_vehicle("bus", &["link"], vec![]);
        link.add_departing(bus);

        let arrived = link.do_sim_step(0, &mut events);
        assert_eq!(vec![Id::get_from_ext("bus")], arrived);
        assert_eq!(0, link.buffer_len());
        assert_eq!(1, link.parked_len());
    }

    #[integration_test]
    fn red_signal_stops_accumulation() {
        let config = test_utils::config();
        // 0.5 veh/s
        let mut link = sim_link(&test_link(1800., 10., 1., 10.), &config);
        link.set_signalized(&[Id::create("next")]);
        link.set_signal_state_all_turning_moves(SignalGroupState::Red)
            .unwrap();
        assert!(!link.has_green_for_to_link(&Id::get_from_ext("next")));

        let mut events = EventsQueue::new();
        for id in ["1", "2"] {
            link.add_from_upstream(create_vehicle(id, &["link", "next"]), 0, &mut events);
        }
        // the first vehicle uses the banked capacity, no more capacity accumulates while red
        let times = times_into_buffer(&mut link, 0, 20);
        assert_eq!(vec![(1, String::from("1"))], times);
        assert!(link.is_active());

        link.set_signal_state_for_turning_move(SignalGroupState::Green, &Id::get_from_ext("next"))
            .unwrap();
        let times = times_into_buffer(&mut link, 20, 25);
        assert_eq!(vec![(21, String::from("2"))], times);
    }

    #[integration_test]
    fn unsignalized_link() {
        let mut link = sim_link(&test_link(1800., 10., 1., 10.), &test_utils::config());
        assert!(link.has_green_for_to_link(&Id::create("anything")));
        assert!(
            link.set_signal_state_all_turning_moves(SignalGroupState::Red)
                .is_err()
        );
    }

    #[integration_test]
    fn stuck_time() {
        let config = config::Simulation {
            stuck_threshold: 10,
            ..test_utils::config()
        };
        let mut link = sim_link(&test_link(3600., 1., 1., 10.), &config);
        let mut events = EventsQueue::new();
        link.add_from_upstream(create_vehicle("1", &["link", "next"]), 0, &mut events);

        link.do_sim_step(9, &mut events);
        assert!(link.offers_veh().is_none());
        assert!(!link.is_veh_stuck(9));

        // the vehicle enters the buffer at 10
        link.do_sim_step(10, &mut events);
        assert_eq!(Some(10), link.buffer_last_moved());
        assert!(!link.is_veh_stuck(20));
        assert!(link.is_veh_stuck(21));

        link.pop_veh(21, &mut events);
        assert!(!link.is_veh_stuck(21));
    }

    #[integration_test]
    fn storage_enlarged_for_slow_link() {
        let config = test_utils::config();
        let mut warnings = CapacityWarnings::new();
        // 10 veh/s for 100s, but only 13.3 veh fit onto the link
        let link = test_link(36000., 1., 1., 100.);
        let mut sim_link = SimLink::from_link(&link, 7.5, &config, &mut warnings);
        assert_approx_eq!(1000., sim_link.storage_capacity());
        assert_eq!(1, warnings.storage_warnings());

        sim_link.recalc_capacities(10, &config, &mut warnings);
        sim_link.recalc_capacities(20, &config, &mut warnings);
        assert_approx_eq!(1000., sim_link.storage_capacity());
        assert_eq!(1, warnings.storage_warnings());
    }

    #[integration_test]
    fn recalc_is_idempotent() {
        let config = config::Simulation {
            holes: config::Holes {
                enabled: true,
                ..Default::default()
            },
            ..test_utils::config()
        };
        let mut warnings = CapacityWarnings::new();
        let mut link = SimLink::from_link(&test_link(1000., 10., 2., 200.), 7.5, &config, &mut warnings);
        let flow = link.flow_cap().capacity_per_time_step();
        let storage = link.storage_capacity();
        let holes = link.holes().unwrap().max_holes();

        link.recalc_capacities(5, &config, &mut warnings);
        link.recalc_capacities(5, &config, &mut warnings);

        assert_eq!(flow, link.flow_cap().capacity_per_time_step());
        assert_eq!(storage, link.storage_capacity());
        assert_eq!(holes, link.holes().unwrap().max_holes());
        assert_eq!(holes, link.holes().unwrap().len());
    }

    #[integration_test]
    fn change_event_modifies_capacities() {
        let config = test_utils::config();
        let mut warnings = CapacityWarnings::new();
        let mut link = SimLink::from_link(&test_link(3600., 10., 2., 150.), 7.5, &config, &mut warnings);
        assert_approx_eq!(40., link.storage_capacity());

        link.apply_change_event(&NetworkChangeEvent {
            time: 0,
            links: vec![Id::get_from_ext("link")],
            freespeed: Some(ChangeValue::Absolute(5.)),
            lanes: Some(ChangeValue::Factor(0.5)),
            flow_capacity: Some(ChangeValue::Factor(2.)),
        })
        .unwrap();
        link.recalc_capacities(0, &config, &mut warnings);

        assert_approx_eq!(30., link.free_flow_travel_time());
        assert_approx_eq!(2., link.flow_cap().capacity_per_time_step());
        // 20 veh from geometry, but 2 veh/s for 30s need 60 veh
        assert_approx_eq!(60., link.storage_capacity());
    }

    #[integration_test]
    fn invalid_change_event_is_rejected() {
        let config = test_utils::config();
        let mut warnings = CapacityWarnings::new();
        let mut link = SimLink::from_link(&test_link(3600., 10., 2., 150.), 7.5, &config, &mut warnings);

        let result = link.apply_change_event(&NetworkChangeEvent {
            time: 0,
            links: vec![Id::get_from_ext("link")],
            freespeed: Some(ChangeValue::Absolute(0.)),
            lanes: None,
            flow_capacity: Some(ChangeValue::Factor(2.)),
        });
        link.recalc_capacities(0, &config, &mut warnings);

        assert!(result.is_err());
        assert_approx_eq!(15., link.free_flow_travel_time());
        assert_approx_eq!(1., link.flow_cap().capacity_per_time_step());
    }

    #[integration_test]
    fn holes_limit_entry() {
        let config = config::Simulation {
            holes: config::Holes {
                enabled: true,
                ..Default::default()
            },
            ..test_utils::config()
        };
        let mut warnings = CapacityWarnings::new();
        // 1 lane, 100m, 360 veh/h: 13.33 storage, 0.1333 - 0.024 veh/m -> 11 holes
        let mut link = SimLink::from_link(&test_link(360., 10., 1., 100.), 7.5, &config, &mut warnings);
        assert_eq!(11, link.holes().unwrap().max_holes());

        let mut events = EventsQueue::new();
        for i in 0..11 {
            assert!(link.has_space(0));
            link.add_from_upstream(
                create_vehicle(&i.to_string(), &["link", "next"]),
                0,
                &mut events,
            );
        }
        // storage is left, but all holes are used
        assert!(link.used_storage() < link.storage_capacity());
        assert!(!link.has_space(0));

        // the first vehicle leaves at 10. Its hole needs about 24s to travel back
        link.do_sim_step(10, &mut events);
        link.pop_veh(10, &mut events);
        assert!(!link.has_space(30));
        assert!(link.has_space(37));
    }

    #[integration_test]
    fn clear_vehicles_reports_stuck() {
        let mut link = sim_link(&test_link(3600., 10., 1., 100.), &test_utils::config());
        let mut events = EventsQueue::new();
        link.add_from_upstream(create_vehicle("1", &["link", "next"]), 0, &mut events);
        link.add_from_upstream(create_vehicle("2", &["link", "next"]), 0, &mut events);
        link.add_departing(create_vehicle("3", &["link", "next"]));
        link.add_parked_vehicle(create_vehicle("4", &["link", "next"]));
        link.do_sim_step(10, &mut events);

        let cleared = link.clear_vehicles(11, &mut events);

        assert_eq!(3, cleared.len());
        assert_eq!(3, events.of_type::<PersonStuckEvent>().len());
        assert_eq!(0, link.veh_count());
        assert_eq!(0, link.parked_len());
        assert_approx_eq!(0., link.used_storage());
    }

    #[integration_test]
    #[should_panic(expected = "has no space left")]
    fn buffer_admission_without_capacity_panics() {
        let mut link = sim_link(&test_link(1800., 10., 1., 10.), &test_utils::config());
        link.flow_cap.refill(true);
        assert!(link.flow_cap.consume());
        link.add_to_buffer(create_vehicle("1", &["link", "next"]), 0);
    }
}
