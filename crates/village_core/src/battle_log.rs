//! Battle narratives.
//!
//! The prose is flavor, the shape is not: every log runs recon, intel,
//! deployment, up to five timed beats, the result, then a comment. The
//! result and comment lines depend on the outcome.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::combat::TroopStack;
use crate::data::{Personality, StructureKind};
use crate::math::{chance, pct, pick, roll_below, roll_inclusive, whole_percent, Fixed};

/// Most beats in one log.
pub const MAX_BEATS: usize = 5;

/// Kind of log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogTag {
    /// Recon report or alarm.
    System,
    /// Opponent composition.
    Intel,
    /// Own forces.
    Deploy,
    /// Timed combat beat.
    Battle,
    /// Settlement.
    Result,
    /// Advisor comment.
    Comment,
}

/// One line of narrative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Line kind.
    #[serde(rename = "type")]
    pub tag: LogTag,
    /// Short label: a phase name or an `mm:ss` battle clock.
    #[serde(rename = "time")]
    pub label: String,
    /// Narrative text.
    pub text: String,
}

const DIRECTIONS: [&str; 8] = [
    "the north",
    "the south",
    "the east",
    "the west",
    "the northeast",
    "the northwest",
    "the southeast",
    "the southwest",
];

struct LogBuilder {
    entries: Vec<LogEntry>,
}

impl LogBuilder {
    fn new() -> Self {
        Self {
            entries: Vec::with_capacity(4 + MAX_BEATS),
        }
    }

    fn line(&mut self, tag: LogTag, label: &str, text: String) {
        self.entries.push(LogEntry {
            tag,
            label: label.to_string(),
            text,
        });
    }

    /// Append up to [`MAX_BEATS`] beats on a clock starting at 00:05.
    fn beats<R: RngCore + ?Sized>(&mut self, events: Vec<String>, rng: &mut R) {
        let mut clock = 5;
        for text in events.into_iter().take(MAX_BEATS) {
            self.line(LogTag::Battle, &format!("00:{clock:02}"), text);
            clock += roll_inclusive(rng, 3, 10);
        }
    }

    fn finish(self) -> Vec<LogEntry> {
        self.entries
    }
}

fn direction<R: RngCore + ?Sized>(rng: &mut R) -> &'static str {
    pick(rng, &DIRECTIONS).copied().unwrap_or("the north")
}

fn describe(stacks: &[TroopStack]) -> String {
    stacks
        .iter()
        .map(|t| format!("{} level-{} {}", t.count, t.level, t.name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn shuffle<T, R: RngCore + ?Sized>(items: &mut [T], rng: &mut R) {
    for i in (1..items.len()).rev() {
        let j = roll_below(rng, i as u32 + 1) as usize;
        items.swap(i, j);
    }
}

fn attack_beat<R: RngCore + ?Sized>(troop: &TroopStack, victory: bool, rng: &mut R) -> String {
    let dir = direction(rng);
    let n = troop.count;
    let options: Vec<String> = match troop.name.as_str() {
        "Barbarian" => vec![
            format!("Barbarians charge from {dir}, roaring!"),
            format!(
                "{n} barbarians swing their axes and {}!",
                if victory { "tear open the line" } else { "meet stiff resistance" }
            ),
        ],
        "Archer" => vec![
            format!("Archers form up in {dir} and loose a volley!"),
            format!(
                "{n} archers fire true, {}.",
                if victory { "and the defenders fall" } else { "but the walls hold" }
            ),
        ],
        "Giant" => vec![
            format!("Giants lumber in from {dir}, shaking the ground!"),
            format!(
                "The giants {}!",
                if victory { "soak up every tower's fire" } else { "fall under the cannons" }
            ),
        ],
        "Goblin" => vec![
            format!("Goblins sneak in from {dir}, heading for the storages!"),
            format!(
                "{n} goblins {}!",
                if victory { "loot the gold storage" } else { "are blown up by traps" }
            ),
        ],
        "Balloon" => vec![
            format!("Balloons rise over {dir} and drop their bombs!"),
            format!(
                "The balloons {}!",
                if victory { "flatten a cannon" } else { "are shot down by air defense" }
            ),
        ],
        "Wizard" => vec![
            format!("Wizards hurl fireballs from {dir}!"),
            format!(
                "{n} wizards cast together and {}!",
                if victory { "buildings turn to ash" } else { "run out of mana" }
            ),
        ],
        "Dragon" => vec![
            format!("Dragons dive from {dir}, breathing fire!"),
            format!(
                "The dragons {}!",
                if victory { "ignore the walls entirely" } else { "take heavy anti-air fire" }
            ),
        ],
        "P.E.K.K.A" => vec![
            format!("A P.E.K.K.A charges from {dir}, sword sweeping!"),
            format!(
                "The P.E.K.K.A {}!",
                if victory { "cleaves through a wall" } else { "is focused down" }
            ),
        ],
        name => vec![
            format!("{name} attack from {dir}!"),
            format!(
                "{n} {name} {}!",
                if victory { "fight bravely" } else { "meet resistance" }
            ),
        ],
    };
    let index = roll_below(rng, options.len() as u32) as usize;
    options.into_iter().nth(index).unwrap_or_default()
}

fn counter_beat<R: RngCore + ?Sized>(troop: &TroopStack, victory: bool, rng: &mut R) -> String {
    let dir = direction(rng);
    let name = &troop.name;
    let options = [
        format!("{} enemy {name} counterattack from {dir}!", troop.count),
        format!(
            "The {name} garrison {}!",
            if victory { "is routed" } else { "holds firm" }
        ),
        format!(
            "Enemy {name} {}!",
            if victory { "fall back" } else { "push back hard" }
        ),
    ];
    let index = roll_below(rng, options.len() as u32) as usize;
    options.into_iter().nth(index).unwrap_or_default()
}

/// Inputs for a raid narrative.
#[derive(Debug, Clone, Copy)]
pub struct RaidReport<'a> {
    /// Defender label, e.g. "12 Merchant".
    pub target: &'a str,
    /// Defender personality, used for the recon summary.
    pub personality: Personality,
    /// Defender power, whole units.
    pub defender_power: u64,
    /// Defender garrison.
    pub garrison: &'a [TroopStack],
    /// Player stacks that took part.
    pub attackers: &'a [TroopStack],
    /// Whether the raid succeeded.
    pub victory: bool,
    /// Attacker share of total power.
    pub power_ratio: Fixed,
    /// Stars earned.
    pub stars: u8,
    /// Loot `(gold, elixir, dark)`.
    pub loot: (u64, u64, u64),
}

/// Narrative for a player raid.
pub fn raid_log<R: RngCore + ?Sized>(report: &RaidReport<'_>, rng: &mut R) -> Vec<LogEntry> {
    let mut log = LogBuilder::new();
    let posture = match report.personality {
        Personality::Aggressive => "heavily guarded",
        Personality::Peaceful => "lightly defended",
        _ => "moderately defended",
    };
    log.line(
        LogTag::System,
        "Recon",
        format!(
            "Target: {}. Defense power {}, {posture}.",
            report.target, report.defender_power
        ),
    );
    if !report.garrison.is_empty() {
        log.line(
            LogTag::Intel,
            "Intel",
            format!("Enemy garrison: {}", describe(report.garrison)),
        );
    }
    if !report.attackers.is_empty() {
        let shown: Vec<String> = report
            .attackers
            .iter()
            .take(3)
            .map(|t| format!("{} {}", t.count, t.name))
            .collect();
        let more = if report.attackers.len() > 3 { " and more" } else { "" };
        log.line(
            LogTag::Deploy,
            "Deploy",
            format!(
                "Deploying {}{more} from {}!",
                shown.join(", "),
                direction(rng)
            ),
        );
    }

    let mut events: Vec<String> = report
        .attackers
        .iter()
        .map(|t| attack_beat(t, report.victory, rng))
        .collect();
    for t in report.garrison {
        if chance(rng, pct(50)) {
            events.push(counter_beat(t, report.victory, rng));
        }
    }
    shuffle(&mut events, rng);
    log.beats(events, rng);

    if report.victory {
        let (gold, elixir, dark) = report.loot;
        let dark_text = if dark > 0 {
            format!(", {dark} dark elixir")
        } else {
            String::new()
        };
        log.line(
            LogTag::Result,
            "Result",
            format!(
                "Victory! {} stars. Looted {gold} gold, {elixir} elixir{dark_text}.",
                report.stars
            ),
        );
        let comment = if report.power_ratio > pct(70) {
            "\"A crushing win. They never stood a chance!\"".to_string()
        } else {
            let options = [
                "\"Nice attack. Good timing and a solid mix of troops.\"",
                "\"Clean raid, they had no answer!\"",
                "\"Decent tactics. Try something bolder next time.\"",
                "\"Loot secured. Keep up the pressure.\"",
            ];
            pick(rng, &options).copied().unwrap_or(options[0]).to_string()
        };
        log.line(LogTag::Comment, "Comment", comment);
    } else {
        log.line(
            LogTag::Result,
            "Result",
            "Defeat! The defenses were too strong and the army retreated.".to_string(),
        );
        let options = [
            format!("\"Their defense is too strong. Bring more troops to take {}.\"", report.target),
            "\"We went in underprepared. Bring a bigger army.\"".to_string(),
            "\"Learn from it and try again!\"".to_string(),
            format!(
                "\"Defeat at {} calls for a new plan.\"",
                report.target
            ),
        ];
        let index = roll_below(rng, options.len() as u32) as usize;
        log.line(
            LogTag::Comment,
            "Comment",
            options.into_iter().nth(index).unwrap_or_default(),
        );
    }
    log.finish()
}

/// Inputs for a defense narrative.
#[derive(Debug, Clone, Copy)]
pub struct DefenseReport<'a> {
    /// Attacker label.
    pub attacker: &'a str,
    /// Committed attacking troops.
    pub attackers: &'a [TroopStack],
    /// Defensive structures `(kind, level)`.
    pub defenses: &'a [(StructureKind, u32)],
    /// Whether the village held.
    pub defended: bool,
    /// Defender share of total power after jitter.
    pub defense_rate: Fixed,
    /// Losses `(gold, elixir, dark)`.
    pub lost: (u64, u64, u64),
}

/// Narrative for an invasion of the player's village.
pub fn defense_log<R: RngCore + ?Sized>(report: &DefenseReport<'_>, rng: &mut R) -> Vec<LogEntry> {
    let mut log = LogBuilder::new();
    log.line(
        LogTag::System,
        "Alert",
        format!("Alarm! {} is attacking the village!", report.attacker),
    );
    if !report.attackers.is_empty() {
        log.line(
            LogTag::Intel,
            "Scout",
            format!("Enemy forces: {}", describe(report.attackers)),
        );
    }
    if !report.defenses.is_empty() {
        let shown: Vec<String> = report
            .defenses
            .iter()
            .take(3)
            .map(|(kind, level)| format!("level-{level} {kind}"))
            .collect();
        let more = if report.defenses.len() > 3 { " and more" } else { "" };
        log.line(
            LogTag::Deploy,
            "Defense",
            format!("Defenses ready: {}{more}!", shown.join(", ")),
        );
    }

    let mut events = Vec::new();
    for t in report.attackers {
        let dir = direction(rng);
        let options = [
            format!("Enemy {} advance from {dir}!", t.name),
            format!(
                "Enemy {} {}!",
                t.name,
                if report.defended { "are driven back" } else { "break through" }
            ),
        ];
        let index = roll_below(rng, options.len() as u32) as usize;
        events.extend(options.into_iter().nth(index));
    }
    for (kind, level) in report.defenses.iter().take(2) {
        events.push(format!(
            "Level-{level} {kind} {}!",
            if report.defended { "scores direct hits" } else { "is outgunned" }
        ));
    }
    log.beats(events, rng);

    if report.defended {
        let damage = 100u32.saturating_sub(whole_percent(report.defense_rate));
        log.line(
            LogTag::Result,
            "Result",
            format!("Defense held! The attack was repelled with {damage}% destruction."),
        );
        log.line(
            LogTag::Comment,
            "Comment",
            "\"The layout paid off. They could not break through.\"".to_string(),
        );
    } else {
        let (gold, elixir, dark) = report.lost;
        let dark_text = if dark > 0 {
            format!(", {dark} dark elixir")
        } else {
            String::new()
        };
        log.line(
            LogTag::Result,
            "Result",
            format!("Defense failed! Lost {gold} gold, {elixir} elixir{dark_text}."),
        );
        log.line(
            LogTag::Comment,
            "Comment",
            "\"Not enough firepower. Upgrade more defenses.\"".to_string(),
        );
    }
    log.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn stack(name: &str, count: u32) -> TroopStack {
        TroopStack {
            name: name.to_string(),
            level: 1,
            count,
        }
    }

    fn tags(log: &[LogEntry]) -> Vec<LogTag> {
        log.iter().map(|e| e.tag).collect()
    }

    #[test]
    fn test_raid_log_order() {
        let attackers: Vec<_> = ["Barbarian", "Archer", "Giant", "Goblin", "Wizard", "Dragon"]
            .iter()
            .map(|n| stack(n, 5))
            .collect();
        let garrison = vec![stack("Archer", 20)];
        let report = RaidReport {
            target: "3 Web Village",
            personality: Personality::Possessive,
            defender_power: 120,
            garrison: &garrison,
            attackers: &attackers,
            victory: true,
            power_ratio: pct(60),
            stars: 2,
            loot: (840, 10, 0),
        };
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let log = raid_log(&report, &mut rng);
        let t = tags(&log);
        assert_eq!(&t[..3], &[LogTag::System, LogTag::Intel, LogTag::Deploy]);
        assert_eq!(t.iter().filter(|t| **t == LogTag::Battle).count(), MAX_BEATS);
        assert_eq!(&t[t.len() - 2..], &[LogTag::Result, LogTag::Comment]);
        assert_eq!(log[3].label, "00:05");
        assert!(log[log.len() - 2].text.contains("840 gold"));
    }

    #[test]
    fn test_defeat_log_has_no_loot() {
        let attackers = vec![stack("Barbarian", 1)];
        let report = RaidReport {
            target: "1 Warmonger",
            personality: Personality::Aggressive,
            defender_power: 500,
            garrison: &[],
            attackers: &attackers,
            victory: false,
            power_ratio: pct(10),
            stars: 0,
            loot: (0, 0, 0),
        };
        let log = raid_log(&report, &mut StepRng::new(0, 0));
        let t = tags(&log);
        assert_eq!(
            t,
            vec![
                LogTag::System,
                LogTag::Deploy,
                LogTag::Battle,
                LogTag::Result,
                LogTag::Comment
            ]
        );
        assert!(log[3].text.starts_with("Defeat"));
    }

    #[test]
    fn test_defense_log_clock_advances() {
        let attackers = vec![stack("Giant", 5), stack("Archer", 20)];
        let defenses = vec![(StructureKind::Cannon, 3), (StructureKind::Mortar, 1)];
        let report = DefenseReport {
            attacker: "8 Hunter's army",
            attackers: &attackers,
            defenses: &defenses,
            defended: false,
            defense_rate: pct(30),
            lost: (100, 50, 0),
        };
        let log = defense_log(&report, &mut StepRng::new(u64::MAX, 0));
        let clocks: Vec<_> = log
            .iter()
            .filter(|e| e.tag == LogTag::Battle)
            .map(|e| e.label.as_str())
            .collect();
        assert_eq!(clocks, vec!["00:05", "00:15", "00:25", "00:35"]);
        assert_eq!(log.last().map(|e| e.tag), Some(LogTag::Comment));
    }
}
