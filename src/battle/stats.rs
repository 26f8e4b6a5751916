use crate::model::{Agent, BattleOutcome};

/// Fold one battle result into both agents' counters.
///
/// Both sides get `total += 1`; victories credit the attacker, defeats the
/// defender. Win rates are recomputed for both.
pub fn apply_outcome(attacker: &mut Agent, defender: &mut Agent, outcome: BattleOutcome) {
    attacker.total += 1;
    defender.total += 1;

    if outcome.attacker_won() {
        attacker.wins += 1;
        defender.losses += 1;
    } else {
        defender.wins += 1;
        attacker.losses += 1;
    }

    attacker.refresh_win_rate();
    defender.refresh_win_rate();
}
