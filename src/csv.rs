use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::config::{CommissionPolicy, ConfigError, ConfigScope};
use crate::engine::OrderAction;
use crate::model::{
    AdminCommissionStatus, Order, OrderId, PaymentMethod, Pricing, SettlementRecord,
    SettlementStatus, Vendor, VendorRef,
};
use crate::{Amount, Percent};

/// Errors that can occur when reading or writing csv files
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("{path}: cannot open: {source}")]
    Open { path: String, source: csv::Error },

    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: unrecognized {field} '{value}'")]
    Unrecognized {
        line: usize,
        field: &'static str,
        value: String,
    },

    #[error("line {line}: {scope} config missing {field}")]
    MissingShare {
        line: usize,
        scope: ConfigScope,
        field: &'static str,
    },

    #[error("line {line}: {source}")]
    InvalidPolicy { line: usize, source: ConfigError },

    #[error("line {line}: {field} {value} is out of range")]
    OutOfRange {
        line: usize,
        field: &'static str,
        value: f64,
    },

    #[error("failed to write settlements: {0}")]
    Write(#[from] csv::Error),

    #[error("failed to flush settlements: {0}")]
    Flush(#[from] io::Error),
}

#[derive(Debug, Deserialize)]
struct VendorRow {
    id: String,
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConfigRow {
    scope: String,
    vendor: Option<String>,
    platform: Option<f64>,
    restaurant: Option<f64>,
    hotel: Option<f64>,
    admin: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OrderRow {
    id: String,
    vendor_kind: String,
    vendor: String,
    payment: String,
    subtotal: f64,
    delivery_fee: Option<f64>,
    platform_fee: Option<f64>,
    tax: Option<f64>,
    total: f64,
    zone: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct ActionRow {
    order: String,
    action: String,
}

#[derive(Debug, Serialize)]
struct SettlementRow<'a> {
    order: &'a OrderId,
    order_status: String,
    settlement_status: SettlementStatus,
    food_price: String,
    restaurant_commission: String,
    net_earning: String,
    admin_commission: String,
    hotel_commission: String,
    platform_fee: String,
    delivery_fee: String,
    gst: String,
    admin_commission_status: AdminCommissionStatus,
}

/// A commission policy version to activate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    pub scope: ConfigScope,
    /// Vendor as written in the file; resolve it before storing the override.
    pub vendor: Option<VendorRef>,
    pub policy: CommissionPolicy,
}

/// Read `(id, code)` vendor pairs
pub fn read_vendors(
    path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = Result<(String, Option<String>), CsvError>>, CsvError> {
    Ok(rows::<VendorRow>(path)?.map(|row| row.map(|(_, r)| (r.id, r.code))))
}

/// Read commission policies; an empty `vendor` column means the global default
pub fn read_configs(
    path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = Result<ConfigEntry, CsvError>>, CsvError> {
    Ok(rows::<ConfigRow>(path)?.map(|row| {
        let (line, row) = row?;
        let share = |value: Option<f64>, scope: ConfigScope, field: &'static str| {
            value
                .map(Percent::from_float)
                .ok_or(CsvError::MissingShare { line, scope, field })
        };

        let policy = match row.scope.as_str() {
            "standard" => {
                let scope = ConfigScope::Standard;
                CommissionPolicy::standard(
                    share(row.platform, scope, "platform")?,
                    share(row.restaurant, scope, "restaurant")?,
                )
            }
            "qr" => {
                let scope = ConfigScope::Qr;
                let hotel = share(row.hotel, scope, "hotel")?;
                let admin = share(row.admin, scope, "admin")?;
                CommissionPolicy::qr(hotel, admin)
                    .map_err(|source| CsvError::InvalidPolicy { line, source })?
            }
            other => {
                return Err(CsvError::Unrecognized {
                    line,
                    field: "scope",
                    value: other.to_string(),
                });
            }
        };

        Ok(ConfigEntry {
            scope: policy.scope(),
            vendor: row.vendor.as_deref().map(parse_vendor_ref),
            policy,
        })
    }))
}

/// Read orders as placed: pending, with no commission snapshot
pub fn read_orders(
    path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = Result<Order, CsvError>>, CsvError> {
    Ok(rows::<OrderRow>(path)?.map(|row| {
        let (line, row) = row?;
        let reference = parse_vendor_ref(&row.vendor);
        let vendor = match row.vendor_kind.as_str() {
            "restaurant" => Vendor::Restaurant(reference),
            "hotel" => Vendor::Hotel(reference),
            other => {
                return Err(CsvError::Unrecognized {
                    line,
                    field: "vendor kind",
                    value: other.to_string(),
                });
            }
        };
        let method = match row.payment.as_str() {
            "online" => PaymentMethod::Online,
            "cash" => PaymentMethod::Cash,
            "pay_at_hotel" => PaymentMethod::PayAtHotel,
            other => {
                return Err(CsvError::Unrecognized {
                    line,
                    field: "payment method",
                    value: other.to_string(),
                });
            }
        };
        let amount = |field: &'static str, value: f64| {
            Amount::checked_from_float(value).ok_or(CsvError::OutOfRange { line, field, value })
        };
        let pricing = Pricing {
            subtotal: amount("subtotal", row.subtotal)?,
            delivery_fee: amount("delivery_fee", row.delivery_fee.unwrap_or_default())?,
            platform_fee: amount("platform_fee", row.platform_fee.unwrap_or_default())?,
            tax: amount("tax", row.tax.unwrap_or_default())?,
            total: amount("total", row.total)?,
        };

        let order = Order::new(OrderId::new(row.id), vendor, method, pricing, row.created_at);
        Ok(match row.zone {
            Some(zone) => order.with_zone(zone),
            None => order,
        })
    }))
}

/// Read `(order, action)` pairs in replay order
pub fn read_actions(
    path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = Result<(OrderId, OrderAction), CsvError>>, CsvError> {
    Ok(rows::<ActionRow>(path)?.map(|row| {
        let (line, row) = row?;
        let action = OrderAction::ALL
            .into_iter()
            .find(|a| a.to_string() == row.action)
            .ok_or_else(|| CsvError::Unrecognized {
                line,
                field: "action",
                value: row.action.clone(),
            })?;
        Ok((OrderId::new(row.order), action))
    }))
}

/// Write settlement records in csv format
pub fn write_settlements<'a>(
    records: impl IntoIterator<Item = &'a SettlementRecord>,
    out: impl io::Write,
) -> Result<(), CsvError> {
    let mut writer = csv::Writer::from_writer(out);

    for record in records {
        let restaurant = &record.restaurant_earning;
        let admin = &record.admin_earning;
        writer.serialize(SettlementRow {
            order: &record.order_id,
            order_status: record.order_status.to_string(),
            settlement_status: record.settlement_status,
            food_price: restaurant.food_price.to_string(),
            restaurant_commission: restaurant.commission.to_string(),
            net_earning: restaurant.net_earning.to_string(),
            admin_commission: admin.commission.to_string(),
            hotel_commission: admin.hotel_commission.to_string(),
            platform_fee: admin.platform_fee.to_string(),
            delivery_fee: admin.delivery_fee.to_string(),
            gst: admin.gst.to_string(),
            admin_commission_status: admin.admin_commission_status,
        })?;
    }

    writer.flush()?;
    Ok(())
}

/// `code:<code>` names a vendor by code; anything else (optionally `id:`-prefixed) is an id.
fn parse_vendor_ref(value: &str) -> VendorRef {
    match value.split_once(':') {
        Some(("code", code)) => VendorRef::Code(code.to_string()),
        Some(("id", id)) => VendorRef::Id(id.to_string()),
        _ => VendorRef::Id(value.to_string()),
    }
}

fn rows<T: DeserializeOwned>(
    path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = Result<(usize, T), CsvError>>, CsvError> {
    let path = path.as_ref();
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| CsvError::Open {
            path: path.display().to_string(),
            source,
        })?;

    Ok(reader
        .into_deserialize::<T>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            result
                .map(|row| (line, row))
                .map_err(|source| CsvError::Parse { line, source })
        }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AdminEarning, OrderStatus, RestaurantEarning};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    const ORDER_HEADER: &str =
        "id,vendor_kind,vendor,payment,subtotal,delivery_fee,platform_fee,tax,total,zone,created_at\n";

    #[test]
    fn read_vendor_with_and_without_code() {
        let file = write_csv("id,code\nr1,R-ONE\nr2,\n");
        let vendors: Vec<_> = read_vendors(file.path())
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(
            vendors,
            vec![("r1".to_string(), Some("R-ONE".to_string())), ("r2".to_string(), None)]
        );
    }

    #[test]
    fn read_standard_and_qr_configs() {
        let file = write_csv(
            "scope,vendor,platform,restaurant,hotel,admin\n\
             standard,,20,80,,\n\
             qr,h1,,,10,10\n\
             standard,code:R-ONE,10,90,,\n",
        );
        let configs: Vec<_> = read_configs(file.path())
            .unwrap()
            .map(Result::unwrap)
            .collect();

        assert_eq!(configs[0].scope, ConfigScope::Standard);
        assert_eq!(configs[0].vendor, None);
        assert_eq!(configs[2].vendor, Some(VendorRef::Code("R-ONE".into())));
        assert_eq!(
            configs[0].policy,
            CommissionPolicy::standard(Percent::whole(20), Percent::whole(80))
        );

        assert_eq!(configs[1].scope, ConfigScope::Qr);
        assert_eq!(configs[1].vendor, Some(VendorRef::Id("h1".into())));
        assert_eq!(
            configs[1].policy.percentages().restaurant,
            Percent::whole(80)
        );
    }

    #[test]
    fn read_config_errors_carry_line() {
        let file = write_csv(
            "scope,vendor,platform,restaurant,hotel,admin\n\
             standard,,20,,,\n\
             qr,,,,70,40\n\
             weekly,,10,90,,\n",
        );
        let results: Vec<_> = read_configs(file.path()).unwrap().collect();
        assert!(matches!(
            results[0],
            Err(CsvError::MissingShare { line: 2, field: "restaurant", .. })
        ));
        assert!(matches!(results[1], Err(CsvError::InvalidPolicy { line: 3, .. })));
        assert!(matches!(
            results[2],
            Err(CsvError::Unrecognized { line: 4, field: "scope", .. })
        ));
    }

    #[test]
    fn read_order() {
        let file = write_csv(&format!(
            "{ORDER_HEADER}o1,hotel,code:H-ONE,pay_at_hotel,900,20,10,0,930,north,2026-05-01T09:00:00Z\n"
        ));
        let order = read_orders(file.path()).unwrap().next().unwrap().unwrap();
        assert_eq!(order.id, OrderId::new("o1"));
        assert_eq!(order.vendor, Vendor::Hotel(VendorRef::Code("H-ONE".into())));
        assert_eq!(order.payment.method, PaymentMethod::PayAtHotel);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total(), Amount::from_float(930.0));
        assert_eq!(order.pricing.tax, Amount::ZERO);
        assert_eq!(order.zone.as_deref(), Some("north"));
        assert!(order.commission_breakdown.is_none());
    }

    #[test]
    fn read_order_with_whitespace_and_empty_fees() {
        let file = write_csv(&format!(
            "{ORDER_HEADER}o2 , restaurant , r1 , online , 100 , , , , 100 , , 2026-05-01T09:00:00Z\n"
        ));
        let order = read_orders(file.path()).unwrap().next().unwrap().unwrap();
        assert_eq!(order.vendor, Vendor::Restaurant(VendorRef::Id("r1".into())));
        assert_eq!(order.pricing.delivery_fee, Amount::ZERO);
        assert_eq!(order.zone, None);
    }

    #[test]
    fn read_order_returns_error_for_unknown_payment() {
        let file = write_csv(&format!(
            "{ORDER_HEADER}o3,restaurant,r1,barter,100,,,,100,,2026-05-01T09:00:00Z\n"
        ));
        let err = read_orders(file.path()).unwrap().next().unwrap().unwrap_err();
        assert!(matches!(
            err,
            CsvError::Unrecognized { line: 2, field: "payment method", .. }
        ));
    }

    #[test]
    fn read_order_rejects_out_of_range_amounts() {
        let file = write_csv(&format!(
            "{ORDER_HEADER}o5,restaurant,r1,online,100,,,,5e16,,2026-05-01T09:00:00Z\n\
             o6,restaurant,r1,online,100,inf,,,100,,2026-05-01T09:00:00Z\n\
             o7,restaurant,r1,online,10000000000000,,,,10000000000000,,2026-05-01T09:00:00Z\n"
        ));
        let results: Vec<_> = read_orders(file.path()).unwrap().collect();
        assert!(matches!(
            results[0],
            Err(CsvError::OutOfRange { line: 2, field: "total", .. })
        ));
        assert!(matches!(
            results[1],
            Err(CsvError::OutOfRange { line: 3, field: "delivery_fee", .. })
        ));
        assert_eq!(results[2].as_ref().unwrap().total(), Amount::MAX);
    }

    #[test]
    fn read_order_returns_parse_error_for_bad_date() {
        let file = write_csv(&format!("{ORDER_HEADER}o4,restaurant,r1,online,100,,,,100,,yesterday\n"));
        let err = read_orders(file.path()).unwrap().next().unwrap().unwrap_err();
        assert!(matches!(err, CsvError::Parse { line: 2, .. }));
    }

    #[test]
    fn read_actions_in_order() {
        let file = write_csv("order,action\no1,accept\no1,collect-payment\no2,explode\n");
        let results: Vec<_> = read_actions(file.path()).unwrap().collect();
        assert_eq!(
            results[0].as_ref().unwrap(),
            &(OrderId::new("o1"), OrderAction::Accept)
        );
        assert_eq!(results[1].as_ref().unwrap().1, OrderAction::CollectPayment);
        assert!(matches!(
            results[2],
            Err(CsvError::Unrecognized { line: 4, field: "action", .. })
        ));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(matches!(
            read_actions("/nonexistent/actions.csv"),
            Err(CsvError::Open { .. })
        ));
    }

    #[test]
    fn write_settlement_rows() {
        let record = SettlementRecord {
            order_id: OrderId::new("o1"),
            restaurant_earning: RestaurantEarning {
                food_price: Amount::from_float(1000.0),
                commission: Amount::from_float(750.0),
                net_earning: Amount::from_float(750.0),
            },
            admin_earning: AdminEarning {
                commission: Amount::from_float(250.0),
                ..Default::default()
            },
            settlement_status: SettlementStatus::Completed,
            order_status: OrderStatus::Delivered,
            revision: 3,
        };

        let mut out = Vec::new();
        write_settlements([&record], &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "order,order_status,settlement_status,food_price,restaurant_commission,net_earning,\
             admin_commission,hotel_commission,platform_fee,delivery_fee,gst,admin_commission_status"
        );
        assert_eq!(
            lines[1],
            "o1,delivered,completed,1000.00,750.00,750.00,250.00,0.00,0.00,0.00,0.00,pending_settlement"
        );
    }
}
