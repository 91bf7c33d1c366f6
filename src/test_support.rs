use crate::domain::models::{
    Address, Calendar, CalendarBootstrap, CalendarSettings, CalendarState, CalendarViewEvent,
    DecryptedEvent, Event, Frequency, Member, Occurrence, RecurrenceRule, SeriesComponent,
    ZonedTime,
};
use crate::infrastructure::bootstrap_cache::InMemoryBootstrapReader;
use crate::infrastructure::ports::RecurrenceMath;
use chrono::{Duration, Months, NaiveDateTime};
use std::collections::HashMap;

const MAX_EXPANSION_STEPS: usize = 10_000;

pub fn local(value: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M").expect("valid local datetime")
}

pub fn sample_calendar() -> Calendar {
    Calendar {
        id: "cal-1".to_string(),
        name: "Personal".to_string(),
        color: "#8080ff".to_string(),
        display: true,
        state: CalendarState::Active,
    }
}

pub fn sample_addresses() -> Vec<Address> {
    vec![Address {
        id: "addr-1".to_string(),
        email: "me@example.com".to_string(),
    }]
}

pub fn sample_bootstrap() -> CalendarBootstrap {
    CalendarBootstrap {
        members: vec![Member {
            id: "member-1".to_string(),
            email: "me@example.com".to_string(),
        }],
        settings: CalendarSettings::default(),
    }
}

/// Reader with the bootstrap of `cal-1` already decrypted.
pub fn ready_reader() -> InMemoryBootstrapReader {
    let reader = InMemoryBootstrapReader::default();
    reader
        .put_calendar("cal-1", sample_bootstrap())
        .expect("seed calendar bootstrap");
    reader
}

pub fn timed_component(start: &str, end: &str) -> SeriesComponent {
    SeriesComponent {
        uid: "uid-fixture".to_string(),
        start: ZonedTime {
            local: local(start),
            tzid: chrono_tz::Europe::Zurich,
        },
        end: ZonedTime {
            local: local(end),
            tzid: chrono_tz::Europe::Zurich,
        },
        is_all_day: false,
        title: "Fixture".to_string(),
        description: String::new(),
        location: String::new(),
        recurrence: None,
        exclusions: Vec::new(),
        alarms: Vec::new(),
    }
}

pub fn timed_event(start: &str, end: &str) -> DecryptedEvent {
    DecryptedEvent {
        component: timed_component(start, end),
        personal_alarms: HashMap::new(),
    }
}

pub fn weekly_series(start: &str, end: &str, count: u32) -> SeriesComponent {
    let mut component = timed_component(start, end);
    component.recurrence = Some(RecurrenceRule {
        frequency: Frequency::Weekly,
        interval: 1,
        count: Some(count),
        until: None,
    });
    component
}

pub fn sample_view_event(id: &str, start: &str, end: &str) -> CalendarViewEvent {
    CalendarViewEvent {
        id: id.to_string(),
        start: local(start),
        end: local(end),
        is_all_day: false,
        calendar: sample_calendar(),
        event: Event {
            id: id.to_string(),
            calendar_id: "cal-1".to_string(),
            author: "me@example.com".to_string(),
        },
        is_recurring: false,
        occurrence: None,
    }
}

/// Straightforward rule stepping, enough to exercise series surgery in tests.
#[derive(Debug, Default)]
pub struct StepRecurrence;

impl StepRecurrence {
    fn step(rule: &RecurrenceRule, from: NaiveDateTime, index: u32) -> Option<NaiveDateTime> {
        let amount = rule.interval.checked_mul(index)?;
        match rule.frequency {
            Frequency::Daily => from.checked_add_signed(Duration::days(i64::from(amount))),
            Frequency::Weekly => from.checked_add_signed(Duration::weeks(i64::from(amount))),
            Frequency::Monthly => from.checked_add_months(Months::new(amount)),
            Frequency::Yearly => from.checked_add_months(Months::new(amount.checked_mul(12)?)),
        }
    }
}

impl RecurrenceMath for StepRecurrence {
    fn occurrences(&self, component: &SeriesComponent, max_count: usize) -> Vec<Occurrence> {
        let start = component.start.local;
        let Some(rule) = &component.recurrence else {
            return vec![Occurrence {
                occurrence_number: 1,
                local_start: start,
                is_single_occurrence: true,
            }]
            .into_iter()
            .take(max_count)
            .collect();
        };

        let mut occurrences = Vec::new();
        for index in 0..MAX_EXPANSION_STEPS as u32 {
            if occurrences.len() >= max_count {
                break;
            }
            if rule.count.is_some_and(|count| index >= count) {
                break;
            }
            let Some(local_start) = Self::step(rule, start, index) else {
                break;
            };
            if rule.until.is_some_and(|until| local_start > until) {
                break;
            }
            if component.exclusions.contains(&local_start) {
                continue;
            }
            occurrences.push(Occurrence {
                occurrence_number: index + 1,
                local_start,
                is_single_occurrence: rule.count == Some(1),
            });
        }
        occurrences
    }
}
