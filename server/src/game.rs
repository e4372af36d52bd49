//! Per-tick simulation step: movement, collisions, scoring and food.
//!
//! Everything here is a pure function of the session state plus a random
//! source. Locking and scheduling live in [`crate::worker`].

use rand::Rng;
use snake_shared::{
    Heading, Position, SessionState, FOOD_SCORE, INITIAL_LENGTH, MAX_FOOD, MAX_PLAYERS,
    MAX_SNAKE_LENGTH, WORLD_HEIGHT, WORLD_WIDTH,
};

/// Random probes before falling back to a full scan of the board.
const RANDOM_PROBES: usize = 64;

/// Advances the session by one tick and reports whether it is still running.
///
/// Slots move in index order, so a later snake sees where earlier snakes have
/// already moved this tick.
pub fn tick<R: Rng + ?Sized>(state: &mut SessionState, rng: &mut R) -> bool {
    for index in 0..MAX_PLAYERS {
        move_snake(state, index);
    }
    replenish_food(state, rng);

    let alive = state.alive_players();
    state.player_count = alive as u32;
    state.running = alive > 0;
    state.running
}

fn move_snake(state: &mut SessionState, index: usize) {
    let slot = &state.slots[index];
    if !slot.alive || slot.paused || slot.heading == Heading::None {
        return;
    }
    let Some(head) = slot.head() else {
        return;
    };
    let next = head.step(slot.heading);

    if state.slots.iter().any(|s| s.alive && s.occupies(next)) {
        let slot = &mut state.slots[index];
        slot.alive = false;
        slot.paused = false;
        return;
    }

    let ate = state.food_items().iter().position(|f| *f == next);
    if let Some(food) = ate {
        let last = state.food_count as usize - 1;
        state.food[food] = state.food[last];
        state.food_count -= 1;
    }

    let slot = &mut state.slots[index];
    let len = slot.length as usize;
    let new_len = if ate.is_some() && len < MAX_SNAKE_LENGTH {
        len + 1
    } else {
        len
    };
    if ate.is_some() {
        slot.score += FOOD_SCORE;
    }
    slot.body.copy_within(0..new_len - 1, 1);
    slot.body[0] = next;
    slot.length = new_len as u32;
}

/// Tops food up to one item per alive player, at least one and at most
/// [`MAX_FOOD`].
pub fn replenish_food<R: Rng + ?Sized>(state: &mut SessionState, rng: &mut R) {
    let target = state.alive_players().clamp(1, MAX_FOOD);
    while (state.food_count as usize) < target {
        let Some(position) = random_free_position(state, rng) else {
            break;
        };
        state.food[state.food_count as usize] = position;
        state.food_count += 1;
    }
}

/// True when no snake segment (alive or dead) and no food item covers `position`.
pub fn is_free(state: &SessionState, position: Position) -> bool {
    !state.slots.iter().any(|s| !s.is_empty() && s.occupies(position))
        && !state.food_items().contains(&position)
}

pub fn random_free_position<R: Rng + ?Sized>(
    state: &SessionState,
    rng: &mut R,
) -> Option<Position> {
    find_position(state, rng, |state, p| is_free(state, p))
}

/// Finds a head position whose initial body, trailing to the left, is free.
pub fn spawn_position<R: Rng + ?Sized>(state: &SessionState, rng: &mut R) -> Option<Position> {
    find_position(state, rng, |state, head| {
        spawn_body(head).iter().all(|p| is_free(state, *p))
    })
}

/// The initial body for a snake heading right with its head at `head`.
pub fn spawn_body(head: Position) -> [Position; INITIAL_LENGTH] {
    let mut body = [head; INITIAL_LENGTH];
    for i in 1..INITIAL_LENGTH {
        body[i] = body[i - 1].step(Heading::Left);
    }
    body
}

fn find_position<R, F>(state: &SessionState, rng: &mut R, accept: F) -> Option<Position>
where
    R: Rng + ?Sized,
    F: Fn(&SessionState, Position) -> bool,
{
    for _ in 0..RANDOM_PROBES {
        let p = Position::new(rng.gen_range(0..WORLD_WIDTH), rng.gen_range(0..WORLD_HEIGHT));
        if accept(state, p) {
            return Some(p);
        }
    }
    (0..WORLD_HEIGHT)
        .flat_map(|y| (0..WORLD_WIDTH).map(move |x| Position::new(x, y)))
        .find(|p| accept(state, *p))
}
