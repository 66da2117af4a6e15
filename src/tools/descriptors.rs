//! Report tools defined as data: grouping fields, metric set and ordering.

use crate::analytics::normalize::{OrderKey, ReportRequest};

use super::params::{Limits, ReportParams};

/// How a descriptor orders its rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultOrder {
    /// First metric, largest first.
    LeadingMetricDesc,
    /// A dimension, ascending.
    DimensionAsc(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub dimensions: &'static [&'static str],
    pub metrics: &'static [&'static str],
    pub order: DefaultOrder,
    pub default_limit: u32,
    /// Whether rows can be joined across periods by their dimension values.
    pub comparable: bool,
}

impl ReportDescriptor {
    /// Build the report request for validated parameters.
    pub fn request(&self, params: &ReportParams, limits: &Limits) -> ReportRequest {
        let order = match self.order {
            DefaultOrder::LeadingMetricDesc => self
                .metrics
                .first()
                .map(|m| (OrderKey::Metric(m.to_string()), true)),
            DefaultOrder::DimensionAsc(dimension) => {
                Some((OrderKey::Dimension(dimension.to_string()), false))
            }
        };

        let request = ReportRequest::new(params.start_date.clone(), params.end_date.clone())
            .dimensions(self.dimensions.iter().copied())
            .metrics(self.metrics.iter().copied())
            .limit(limits.clamp(params.limit.unwrap_or(self.default_limit)));

        match order {
            Some((key, desc)) => request.order_by(key, desc),
            None => request,
        }
    }

    pub fn key_fields(&self) -> Vec<String> {
        self.dimensions.iter().map(|d| d.to_string()).collect()
    }
}

pub static REPORT_DESCRIPTORS: &[ReportDescriptor] = &[
    ReportDescriptor {
        name: "traffic_sources",
        description: "Sessions, users and key events by traffic source and medium",
        dimensions: &["sessionSource", "sessionMedium"],
        metrics: &["sessions", "totalUsers", "engagedSessions", "keyEvents"],
        order: DefaultOrder::LeadingMetricDesc,
        default_limit: 25,
        comparable: true,
    },
    ReportDescriptor {
        name: "channel_performance",
        description: "Sessions, engagement, key events and revenue by default channel group",
        dimensions: &["sessionDefaultChannelGroup"],
        metrics: &[
            "sessions",
            "totalUsers",
            "engagementRate",
            "keyEvents",
            "totalRevenue",
        ],
        order: DefaultOrder::LeadingMetricDesc,
        default_limit: 25,
        comparable: true,
    },
    ReportDescriptor {
        name: "top_pages",
        description: "Most viewed pages with users and engagement time",
        dimensions: &["pagePath", "pageTitle"],
        metrics: &["screenPageViews", "totalUsers", "userEngagementDuration"],
        order: DefaultOrder::LeadingMetricDesc,
        default_limit: 25,
        comparable: true,
    },
    ReportDescriptor {
        name: "landing_pages",
        description: "Entry pages with sessions, engagement rate, bounce rate and key events",
        dimensions: &["landingPage"],
        metrics: &["sessions", "engagementRate", "bounceRate", "keyEvents"],
        order: DefaultOrder::LeadingMetricDesc,
        default_limit: 25,
        comparable: true,
    },
    ReportDescriptor {
        name: "device_breakdown",
        description: "Sessions, users and engagement by device category",
        dimensions: &["deviceCategory"],
        metrics: &["sessions", "totalUsers", "engagementRate"],
        order: DefaultOrder::LeadingMetricDesc,
        default_limit: 10,
        comparable: true,
    },
    ReportDescriptor {
        name: "geo_breakdown",
        description: "Sessions and users by country and city",
        dimensions: &["country", "city"],
        metrics: &["sessions", "totalUsers"],
        order: DefaultOrder::LeadingMetricDesc,
        default_limit: 25,
        comparable: true,
    },
    ReportDescriptor {
        name: "key_events",
        description: "Key event (conversion) counts by event name",
        dimensions: &["eventName"],
        metrics: &["keyEvents", "eventCount", "totalUsers"],
        order: DefaultOrder::LeadingMetricDesc,
        default_limit: 25,
        comparable: true,
    },
    ReportDescriptor {
        name: "daily_trend",
        description: "Daily sessions, users and page views in date order",
        dimensions: &["date"],
        metrics: &["sessions", "totalUsers", "screenPageViews"],
        order: DefaultOrder::DimensionAsc("date"),
        default_limit: 366,
        comparable: false,
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const LIMITS: Limits = Limits { max_rows: 10_000 };

    fn params(value: serde_json::Value) -> ReportParams {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_descriptor_names_unique() {
        for (i, d) in REPORT_DESCRIPTORS.iter().enumerate() {
            assert!(
                REPORT_DESCRIPTORS[..i].iter().all(|o| o.name != d.name),
                "duplicate descriptor {}",
                d.name
            );
            assert!(!d.metrics.is_empty());
        }
    }

    #[test]
    fn test_request_uses_defaults() {
        let channels = REPORT_DESCRIPTORS
            .iter()
            .find(|d| d.name == "channel_performance")
            .unwrap();
        let request = channels.request(&params(json!({})), &LIMITS);

        assert_eq!(request.date_range.start_date, "28daysAgo");
        assert_eq!(request.date_range.end_date, "yesterday");
        assert_eq!(request.limit, 25);
        assert_eq!(request.dimensions, vec!["sessionDefaultChannelGroup"]);

        let order = request.order_by.unwrap();
        assert_eq!(order.key, OrderKey::Metric("sessions".to_string()));
        assert!(order.desc);
    }

    #[test]
    fn test_daily_trend_ordered_by_date() {
        let trend = REPORT_DESCRIPTORS
            .iter()
            .find(|d| d.name == "daily_trend")
            .unwrap();
        let request = trend.request(&params(json!({"limit": 30})), &LIMITS);

        assert_eq!(request.limit, 30);
        let order = request.order_by.unwrap();
        assert_eq!(order.key, OrderKey::Dimension("date".to_string()));
        assert!(!order.desc);
        assert!(!trend.comparable);
    }

    #[test]
    fn test_default_limit_capped_by_max_rows() {
        let trend = REPORT_DESCRIPTORS
            .iter()
            .find(|d| d.name == "daily_trend")
            .unwrap();
        let small = Limits { max_rows: 100 };

        assert_eq!(trend.request(&params(json!({})), &LIMITS).limit, 366);
        assert_eq!(trend.request(&params(json!({})), &small).limit, 100);
        assert_eq!(trend.request(&params(json!({"limit": 40})), &small).limit, 40);
    }
}
