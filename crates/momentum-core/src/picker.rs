//! Date/time picker session state.
//!
//! A session starts with [`DateTimePicker::open`] and ends with exactly one
//! [`PickerOutcome`], produced by [`DateTimePicker::confirm`] or
//! [`DateTimePicker::cancel`]. Transitions sent while no session is open are
//! ignored. Nothing here renders; views read the accessors and feed
//! [`PickerMsg`] values back through [`DateTimePicker::update`].

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::{debug, trace};

use crate::calendar::{CalendarPage, month_name};
use crate::clock::TimeOfDay;
use crate::datetime::{local_date, local_to_utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PickerTab {
    #[default]
    Date,
    Time,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickerMsg {
    PrevMonth,
    NextMonth,
    SelectDay(u32),
    SwitchTab(PickerTab),
    HourUp,
    HourDown,
    MinuteUp,
    MinuteDown,
    Confirm,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickerOutcome {
    Confirmed(DateTime<Utc>),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Session {
    tab: PickerTab,
    selected: NaiveDate,
    view_year: i32,
    view_month0: u32,
    time: TimeOfDay,
}

#[derive(Debug, Clone)]
pub struct DateTimePicker {
    tz: Tz,
    session: Option<Session>,
}

impl DateTimePicker {
    pub fn new(tz: Tz) -> Self {
        Self { tz, session: None }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// Starts a session seeded from `initial` as seen in the picker's zone.
    /// Any session already open is replaced.
    pub fn open(&mut self, initial: DateTime<Utc>) {
        let local = initial.with_timezone(&self.tz);
        let selected = local.date_naive();
        self.session = Some(Session {
            tab: PickerTab::Date,
            selected,
            view_year: selected.year(),
            view_month0: selected.month0(),
            time: TimeOfDay::from_time(local.time()),
        });
        debug!(initial = %local, "picker opened");
    }

    pub fn update(&mut self, msg: PickerMsg) -> Option<PickerOutcome> {
        trace!(?msg, "picker message");
        match msg {
            PickerMsg::PrevMonth => self.prev_month(),
            PickerMsg::NextMonth => self.next_month(),
            PickerMsg::SelectDay(day) => {
                self.select_day(day);
            }
            PickerMsg::SwitchTab(tab) => self.switch_tab(tab),
            PickerMsg::HourUp => self.adjust_time(TimeOfDay::hour_up),
            PickerMsg::HourDown => self.adjust_time(TimeOfDay::hour_down),
            PickerMsg::MinuteUp => self.adjust_time(TimeOfDay::minute_up),
            PickerMsg::MinuteDown => self.adjust_time(TimeOfDay::minute_down),
            PickerMsg::Confirm => return self.confirm(),
            PickerMsg::Cancel => return self.cancel(),
        }
        None
    }

    pub fn prev_month(&mut self) {
        if let Some(s) = self.session.as_mut() {
            if s.view_month0 == 0 {
                s.view_month0 = 11;
                s.view_year -= 1;
            } else {
                s.view_month0 -= 1;
            }
        }
    }

    pub fn next_month(&mut self) {
        if let Some(s) = self.session.as_mut() {
            if s.view_month0 >= 11 {
                s.view_month0 = 0;
                s.view_year += 1;
            } else {
                s.view_month0 += 1;
            }
        }
    }

    /// Selects `day` of the month on view. Returns `false`, leaving the
    /// selection alone, when that page has no such day.
    pub fn select_day(&mut self, day: u32) -> bool {
        let Some(s) = self.session.as_mut() else {
            return false;
        };
        let in_page = CalendarPage::new(s.view_year, s.view_month0).contains_day(day);
        let date = in_page
            .then(|| NaiveDate::from_ymd_opt(s.view_year, s.view_month0 + 1, day))
            .flatten();
        match date {
            Some(date) => {
                s.selected = date;
                true
            }
            None => {
                debug!(
                    day,
                    year = s.view_year,
                    month0 = s.view_month0,
                    "ignoring day outside the page"
                );
                false
            }
        }
    }

    pub fn switch_tab(&mut self, tab: PickerTab) {
        if let Some(s) = self.session.as_mut() {
            s.tab = tab;
        }
    }

    pub fn hour_up(&mut self) {
        self.adjust_time(TimeOfDay::hour_up);
    }

    pub fn hour_down(&mut self) {
        self.adjust_time(TimeOfDay::hour_down);
    }

    pub fn minute_up(&mut self) {
        self.adjust_time(TimeOfDay::minute_up);
    }

    pub fn minute_down(&mut self) {
        self.adjust_time(TimeOfDay::minute_down);
    }

    fn adjust_time(&mut self, step: fn(&mut TimeOfDay)) {
        if let Some(s) = self.session.as_mut() {
            step(&mut s.time);
        }
    }

    /// Ends the session with the selected date and time as one instant.
    pub fn confirm(&mut self) -> Option<PickerOutcome> {
        let s = self.session.take()?;
        let local = s.selected.and_time(s.time.to_naive_time());
        let instant = local_to_utc(&self.tz, local);
        debug!(local = %local, utc = %instant, "picker confirmed");
        Some(PickerOutcome::Confirmed(instant))
    }

    pub fn cancel(&mut self) -> Option<PickerOutcome> {
        self.session.take()?;
        debug!("picker cancelled");
        Some(PickerOutcome::Cancelled)
    }

    pub fn tab(&self) -> Option<PickerTab> {
        self.session.as_ref().map(|s| s.tab)
    }

    pub fn selected_date(&self) -> Option<NaiveDate> {
        self.session.as_ref().map(|s| s.selected)
    }

    /// `(year, month0)` of the page on view.
    pub fn view(&self) -> Option<(i32, u32)> {
        self.session.as_ref().map(|s| (s.view_year, s.view_month0))
    }

    pub fn time(&self) -> Option<TimeOfDay> {
        self.session.as_ref().map(|s| s.time)
    }

    pub fn page(&self) -> Option<CalendarPage> {
        self.view()
            .map(|(year, month0)| CalendarPage::new(year, month0))
    }

    pub fn is_selected(&self, day: u32) -> bool {
        self.session.as_ref().is_some_and(|s| {
            s.selected.day() == day
                && s.selected.month0() == s.view_month0
                && s.selected.year() == s.view_year
        })
    }

    pub fn is_today(&self, day: u32, now: DateTime<Utc>) -> bool {
        let today = local_date(now, &self.tz);
        self.view().is_some_and(|(year, month0)| {
            today.day() == day && today.month0() == month0 && today.year() == year
        })
    }

    /// `March 2025`
    pub fn month_title(&self) -> Option<String> {
        self.view()
            .map(|(year, month0)| format!("{} {year}", month_name(month0)))
    }

    /// `Mar 5, 2025  ·  9:00 AM`
    pub fn preview_text(&self) -> Option<String> {
        self.session.as_ref().map(|s| {
            format!(
                "{}  ·  {}",
                s.selected.format("%b %-d, %Y"),
                s.time.format_12h()
            )
        })
    }
}
