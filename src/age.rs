//! Human-readable age in the form "X years, Y months, Z days".
//!
//! Chrono has no built-in year/month/day diff (unlike Python's
//! relativedelta), so the calendar rules are implemented manually: a
//! month elapses on the same day-of-month, clamped to the target
//! month's length, and day underflow is measured from the birthdate
//! advanced by the whole elapsed years and months.

use chrono::{Datelike, NaiveDate};

/// Elapsed time since `birthdate` as a string, with a cake marker when
/// today is an exact anniversary (zero months and zero days elapsed).
pub fn age_string(birthdate: NaiveDate, today: NaiveDate) -> String {
    let mut years = today.year() - birthdate.year();
    let mut months = today.month() as i32 - birthdate.month() as i32;
    let mut days = today.day() as i32 - birthdate.day() as i32;

    if days < 0 {
        months -= 1;
    }
    if months < 0 {
        years -= 1;
        months += 12;
    }
    if days < 0 {
        let anchor = advance(birthdate, years, months);
        days = (today - anchor).num_days() as i32;
    }

    let cake = if months == 0 && days == 0 { " 🎂" } else { "" };

    format!(
        "{} year{}, {} month{}, {} day{}{}",
        years,
        plural(years),
        months,
        plural(months),
        days,
        plural(days),
        cake
    )
}

fn plural(n: i32) -> &'static str {
    if n == 1 { "" } else { "s" }
}

/// `date` moved forward by whole years and months, day-of-month clamped
/// to the target month's length (Jan 31 + 1 month = Feb 28/29).
fn advance(date: NaiveDate, years: i32, months: i32) -> NaiveDate {
    let total = date.year() * 12 + date.month0() as i32 + years * 12 + months;
    let year = total.div_euclid(12);
    let month = total.rem_euclid(12) as u32 + 1;
    let day = date.day().min(days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(date)
}

/// Days in a given year/month, leap years handled.
fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
        _ => 30, // should never occur but keeps the function total
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}
