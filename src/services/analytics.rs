//! Dashboard numbers computed from already-fetched records.
//!
//! Everything here is a pure function of its inputs.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::{ApprovalStatus, Booking, BookingStatus, Provider, Service, User};

/// Bookings per status, with every status present.
pub fn count_by_status(bookings: &[Booking]) -> BTreeMap<BookingStatus, usize> {
    let mut counts: BTreeMap<BookingStatus, usize> =
        BookingStatus::ALL.into_iter().map(|s| (s, 0)).collect();
    for booking in bookings {
        *counts.entry(booking.status).or_default() += 1;
    }
    counts
}

/// Adds amounts, pinning at `Decimal::MAX`/`MIN` instead of overflowing.
pub fn saturating_total(amounts: impl IntoIterator<Item = Decimal>) -> Decimal {
    amounts.into_iter().fold(Decimal::ZERO, |acc, amount| {
        acc.checked_add(amount).unwrap_or(if amount.is_sign_negative() {
            Decimal::MIN
        } else {
            Decimal::MAX
        })
    })
}

/// Sum of `total_amount` over bookings in `status`.
pub fn revenue(bookings: &[Booking], status: BookingStatus) -> Decimal {
    saturating_total(
        bookings
            .iter()
            .filter(|b| b.status == status)
            .map(|b| b.total_amount),
    )
}

pub fn completed_revenue(bookings: &[Booking]) -> Decimal {
    revenue(bookings, BookingStatus::Completed)
}

/// Completed revenue over completed count; zero when nothing is completed.
pub fn average_order_value(bookings: &[Booking]) -> Decimal {
    let completed = bookings
        .iter()
        .filter(|b| b.status == BookingStatus::Completed)
        .count();
    if completed == 0 {
        return Decimal::ZERO;
    }
    completed_revenue(bookings)
        .checked_div(Decimal::from(completed))
        .unwrap_or(Decimal::ZERO)
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ServicePopularity {
    #[serde(flatten)]
    pub service: Service,
    pub total_bookings: usize,
}

/// The `n` most booked services. Ties keep the order of `services`.
pub fn top_services(bookings: &[Booking], services: &[Service], n: usize) -> Vec<ServicePopularity> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for booking in bookings {
        *counts.entry(booking.service_id.as_str()).or_default() += 1;
    }

    let mut ranked: Vec<ServicePopularity> = services
        .iter()
        .map(|service| ServicePopularity {
            total_bookings: counts.get(service.id.as_str()).copied().unwrap_or(0),
            service: service.clone(),
        })
        .collect();
    // stable, so equal counts stay in catalogue order
    ranked.sort_by(|a, b| b.total_bookings.cmp(&a.total_bookings));
    ranked.truncate(n);
    ranked
}

/// Customers with at least one booking.
pub fn active_customers(bookings: &[Booking]) -> usize {
    bookings
        .iter()
        .map(|b| b.customer_id.as_str())
        .collect::<HashSet<_>>()
        .len()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Period {
    Today,
    Week,
    Month,
    #[default]
    All,
}

impl Period {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "today" => Some(Period::Today),
            "week" => Some(Period::Week),
            "month" => Some(Period::Month),
            "all" => Some(Period::All),
            _ => None,
        }
    }

    /// Midnight of today, of the last Sunday, or of the 1st of the month.
    pub fn start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let today = now.date_naive();
        let day = match self {
            Period::Today => today,
            Period::Week => today - Duration::days(today.weekday().num_days_from_sunday() as i64),
            Period::Month => today.with_day(1)?,
            Period::All => return None,
        };
        Some(Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN)))
    }
}

/// Completed jobs finished within `period`.
pub fn filter_by_period(jobs: &[Booking], period: Period, now: DateTime<Utc>) -> Vec<Booking> {
    let start = period.start(now);
    jobs.iter()
        .filter(|b| b.status == BookingStatus::Completed)
        .filter(|b| match start {
            Some(start) => b.completed_at.is_some_and(|t| t >= start),
            None => true,
        })
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct Earnings {
    pub today: Decimal,
    pub week: Decimal,
    pub month: Decimal,
    pub total: Decimal,
}

pub fn earnings(jobs: &[Booking], now: DateTime<Utc>) -> Earnings {
    let sum = |period: Period| -> Decimal {
        saturating_total(
            filter_by_period(jobs, period, now)
                .iter()
                .map(|b| b.total_amount),
        )
    };
    Earnings {
        today: sum(Period::Today),
        week: sum(Period::Week),
        month: sum(Period::Month),
        total: sum(Period::All),
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CustomerStats {
    pub total_bookings: usize,
    pub completed_bookings: usize,
    pub total_spent: Decimal,
}

pub fn customer_stats(bookings: &[Booking]) -> CustomerStats {
    CustomerStats {
        total_bookings: bookings.len(),
        completed_bookings: bookings
            .iter()
            .filter(|b| b.status == BookingStatus::Completed)
            .count(),
        total_spent: completed_revenue(bookings),
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProviderStats {
    pub today_jobs: usize,
    pub completed_jobs: usize,
    pub earnings: Decimal,
}

pub fn provider_stats(bookings: &[Booking], now: DateTime<Utc>) -> ProviderStats {
    let today = now.date_naive();
    ProviderStats {
        today_jobs: bookings
            .iter()
            .filter(|b| b.created_at.date_naive() == today)
            .count(),
        completed_jobs: bookings
            .iter()
            .filter(|b| b.status == BookingStatus::Completed)
            .count(),
        earnings: completed_revenue(bookings),
    }
}

/// The provider's profile card.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProviderProfile {
    pub total_jobs: usize,
    pub total_earnings: Decimal,
    /// Mean of customer ratings, else the rating stored on the profile.
    pub rating: Option<f64>,
    pub member_since: DateTime<Utc>,
}

pub fn provider_profile(provider: &Provider, bookings: &[Booking]) -> ProviderProfile {
    let ratings: Vec<f64> = bookings
        .iter()
        .filter_map(|b| b.rating)
        .map(f64::from)
        .collect();
    let rating = if ratings.is_empty() {
        provider.rating
    } else {
        Some(ratings.iter().sum::<f64>() / ratings.len() as f64)
    };

    ProviderProfile {
        total_jobs: bookings
            .iter()
            .filter(|b| b.status == BookingStatus::Completed)
            .count(),
        total_earnings: completed_revenue(bookings),
        rating,
        member_since: provider.created_at,
    }
}

/// The customer booking list tabs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BookingTab {
    #[default]
    All,
    Active,
    Completed,
    Cancelled,
}

impl BookingTab {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "all" => Some(BookingTab::All),
            "active" => Some(BookingTab::Active),
            "completed" => Some(BookingTab::Completed),
            "cancelled" => Some(BookingTab::Cancelled),
            _ => None,
        }
    }

    pub fn contains(&self, status: BookingStatus) -> bool {
        match self {
            BookingTab::All => true,
            BookingTab::Active => status.is_active(),
            BookingTab::Completed => status == BookingStatus::Completed,
            BookingTab::Cancelled => {
                matches!(status, BookingStatus::Cancelled | BookingStatus::Rejected)
            }
        }
    }
}

pub fn partition_tab(bookings: &[Booking], tab: BookingTab) -> Vec<Booking> {
    bookings
        .iter()
        .filter(|b| tab.contains(b.status))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AdminAnalytics {
    pub total_revenue: Decimal,
    pub total_bookings: usize,
    pub active_users: usize,
    pub avg_order_value: Decimal,
    pub top_services: Vec<ServicePopularity>,
}

pub fn admin_analytics(bookings: &[Booking], services: &[Service], top_n: usize) -> AdminAnalytics {
    AdminAnalytics {
        total_revenue: completed_revenue(bookings),
        total_bookings: bookings.len(),
        active_users: active_customers(bookings),
        avg_order_value: average_order_value(bookings),
        top_services: top_services(bookings, services, top_n),
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AdminOverview {
    pub total_users: usize,
    pub total_providers: usize,
    pub pending_providers: usize,
    pub total_bookings: usize,
    pub total_revenue: Decimal,
}

pub fn admin_overview(users: &[User], providers: &[Provider], bookings: &[Booking]) -> AdminOverview {
    AdminOverview {
        total_users: users.len(),
        total_providers: providers.len(),
        pending_providers: providers
            .iter()
            .filter(|p| p.status == ApprovalStatus::Pending)
            .count(),
        total_bookings: bookings.len(),
        total_revenue: completed_revenue(bookings),
    }
}
