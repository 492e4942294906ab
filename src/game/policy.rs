//! Bot policy adapter: turns a room snapshot into a feature vector, hands it
//! to an injected inference capability, and interprets the 3-way output as a
//! turn relative to the bot's current heading.
//!
//! The inference function itself (the 20→128→3 network) is an external
//! collaborator; this module only owns the feature encoding and the
//! argmax-to-turn mapping around it.

use std::collections::HashSet;

use crate::game::grid::{Cell, Direction};

pub const FEATURE_LEN: usize = 20;

/// A read-only inference capability shared across every bot in every room.
/// Implementors must be safe to call concurrently from multiple room locks.
pub trait BotPolicy: Send + Sync {
    /// Returns raw scores for [straight, right turn, left turn]; the adapter
    /// takes the argmax.
    fn infer(&self, features: &[i32; FEATURE_LEN]) -> [f32; 3];
}

/// Fallback used when no trained policy was loaded at startup: always scores
/// "straight" highest, so a bot simply holds its current direction.
pub struct HoldDirectionPolicy;

impl BotPolicy for HoldDirectionPolicy {
    fn infer(&self, _features: &[i32; FEATURE_LEN]) -> [f32; 3] {
        [1.0, 0.0, 0.0]
    }
}

/// Builds the 20-dimensional feature vector for a bot at `head` facing
/// `direction`, given the room's occupied cells and food cells.
pub fn build_features(
    head: Cell,
    direction: Direction,
    occupied: &HashSet<Cell>,
    food: &HashSet<Cell>,
    width: u16,
    height: u16,
) -> [i32; FEATURE_LEN] {
    let mut f = [0i32; FEATURE_LEN];

    // 1-4: body occupancy at the four neighbors, order R, L, U, D.
    let neighbor_order = [Direction::Right, Direction::Left, Direction::Up, Direction::Down];
    for (i, &dir) in neighbor_order.iter().enumerate() {
        let cell = head.stepped(dir);
        f[i] = occupied.contains(&cell) as i32;
    }

    // 5-8: wall danger at the same four neighbors.
    for (i, &dir) in neighbor_order.iter().enumerate() {
        let cell = head.stepped(dir);
        f[4 + i] = (!cell.in_bounds(width, height)) as i32;
    }

    // 9-12: ray body, order L, R, U, D.
    f[8] = ray_hits_body(head, -1, 0, occupied, |c| c.x >= 0) as i32;
    f[9] = ray_hits_body(head, 1, 0, occupied, |c| c.x < width as i32) as i32;
    f[10] = ray_hits_body(head, 0, -1, occupied, |c| c.y >= 0) as i32;
    f[11] = ray_hits_body(head, 0, 1, occupied, |c| c.y < height as i32) as i32;

    // 13-16: direction one-hot, order L, R, U, D.
    let dir_order = [Direction::Left, Direction::Right, Direction::Up, Direction::Down];
    for (i, &dir) in dir_order.iter().enumerate() {
        f[12 + i] = (direction == dir) as i32;
    }

    // 17-20: food bearing relative to the nearest food cell, order L, R, U, D.
    if let Some(nearest) = food.iter().min_by_key(|c| head.manhattan_distance(**c)) {
        f[16] = (nearest.x < head.x) as i32;
        f[17] = (nearest.x > head.x) as i32;
        f[18] = (nearest.y < head.y) as i32;
        f[19] = (nearest.y > head.y) as i32;
    }

    f
}

/// Walks from `head` (exclusive) one step at a time in direction (`dx`,`dy`)
/// while `in_range` holds, returning true if any visited cell is occupied.
fn ray_hits_body(
    head: Cell,
    dx: i32,
    dy: i32,
    occupied: &HashSet<Cell>,
    in_range: impl Fn(Cell) -> bool,
) -> bool {
    let mut cell = Cell::new(head.x + dx, head.y + dy);
    while in_range(cell) {
        if occupied.contains(&cell) {
            return true;
        }
        cell = Cell::new(cell.x + dx, cell.y + dy);
    }
    false
}

/// Runs the full adapter: builds features, invokes the policy, and maps its
/// argmax output to an absolute direction.
pub fn decide_bot_direction(
    policy: &dyn BotPolicy,
    head: Cell,
    direction: Direction,
    occupied: &HashSet<Cell>,
    food: &HashSet<Cell>,
    width: u16,
    height: u16,
) -> Direction {
    let features = build_features(head, direction, occupied, food, width, height);
    let scores = policy.infer(&features);
    let argmax = scores
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0);

    match argmax {
        0 => direction,
        1 => direction.turn_right(),
        _ => direction.turn_left(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysTurnRight;
    impl BotPolicy for AlwaysTurnRight {
        fn infer(&self, _features: &[i32; FEATURE_LEN]) -> [f32; 3] {
            [0.0, 1.0, 0.0]
        }
    }

    #[test]
    fn hold_direction_policy_keeps_heading() {
        let occupied = HashSet::new();
        let food = HashSet::new();
        let dir = decide_bot_direction(
            &HoldDirectionPolicy,
            Cell::new(5, 5),
            Direction::Right,
            &occupied,
            &food,
            50,
            50,
        );
        assert_eq!(dir, Direction::Right);
    }

    #[test]
    fn argmax_one_turns_clockwise() {
        let occupied = HashSet::new();
        let food = HashSet::new();
        let dir = decide_bot_direction(
            &AlwaysTurnRight,
            Cell::new(5, 5),
            Direction::Right,
            &occupied,
            &food,
            50,
            50,
        );
        assert_eq!(dir, Direction::Down);
    }

    #[test]
    fn wall_danger_flags_off_map_neighbors() {
        let occupied = HashSet::new();
        let food = HashSet::new();
        let features = build_features(Cell::new(0, 0), Direction::Right, &occupied, &food, 5, 5);
        // neighbor order R,L,U,D at (0,0): R=(1,0) in-bounds, L=(-1,0) off-map,
        // U=(0,-1) off-map, D=(0,1) in-bounds.
        assert_eq!(features[4], 0); // wall at R
        assert_eq!(features[5], 1); // wall at L
        assert_eq!(features[6], 1); // wall at U
        assert_eq!(features[7], 0); // wall at D
    }

    #[test]
    fn food_bearing_points_toward_nearest_food() {
        let occupied = HashSet::new();
        let mut food = HashSet::new();
        food.insert(Cell::new(2, 2));
        let features = build_features(Cell::new(5, 5), Direction::Right, &occupied, &food, 50, 50);
        // food is up-left of head
        assert_eq!(features[16], 1); // left
        assert_eq!(features[17], 0); // right
        assert_eq!(features[18], 1); // up
        assert_eq!(features[19], 0); // down
    }
}
