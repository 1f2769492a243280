//! Purchase Plans
//!
//! The fixed catalogue of purchasable plans and what each one grants.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use roteiro_entitlements::SubscriptionTier;

use crate::error::{PaymentError, Result};

/// Purchasable plans
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PurchasePlan {
    /// One itinerary credit
    SingleCredit,
    /// Five itinerary credits
    CreditPack,
    /// One month of subscriber access
    MonthlySubscription,
    /// Twelve months of subscriber access
    AnnualSubscription,
}

impl PurchasePlan {
    pub fn as_str(&self) -> &str {
        match self {
            PurchasePlan::SingleCredit => "single-credit",
            PurchasePlan::CreditPack => "credit-pack",
            PurchasePlan::MonthlySubscription => "monthly-subscription",
            PurchasePlan::AnnualSubscription => "annual-subscription",
        }
    }

    /// Parse a plan code; unknown codes are an error, never a default
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "single-credit" => Ok(PurchasePlan::SingleCredit),
            "credit-pack" => Ok(PurchasePlan::CreditPack),
            "monthly-subscription" => Ok(PurchasePlan::MonthlySubscription),
            "annual-subscription" => Ok(PurchasePlan::AnnualSubscription),
            other => Err(PaymentError::UnknownPlan(other.into())),
        }
    }

    /// What completing this purchase grants
    pub fn grant(&self) -> Grant {
        match self {
            PurchasePlan::SingleCredit => Grant::Credits(1),
            PurchasePlan::CreditPack => Grant::Credits(5),
            PurchasePlan::MonthlySubscription => Grant::Subscription(SubscriptionTier::Monthly),
            PurchasePlan::AnnualSubscription => Grant::Subscription(SubscriptionTier::Annual),
        }
    }

    /// Get pricing for this plan
    pub fn pricing(&self) -> PlanPricing {
        match self {
            PurchasePlan::SingleCredit => PlanPricing {
                title: "Roteiro avulso".into(),
                description: "1 roteiro de viagem personalizado".into(),
                amount: dec!(19.90),
            },
            PurchasePlan::CreditPack => PlanPricing {
                title: "Pacote de roteiros".into(),
                description: "5 roteiros de viagem personalizados".into(),
                amount: dec!(79.90),
            },
            PurchasePlan::MonthlySubscription => PlanPricing {
                title: "Assinatura mensal".into(),
                description: "Roteiros ilimitados e chat com o assistente".into(),
                amount: dec!(29.90),
            },
            PurchasePlan::AnnualSubscription => PlanPricing {
                title: "Assinatura anual".into(),
                description: "12 meses de roteiros ilimitados e chat sem limites".into(),
                amount: dec!(299.00),
            },
        }
    }
}

/// Effect of a completed purchase on the buyer's ledger
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Grant {
    Credits(u32),
    Subscription(SubscriptionTier),
}

/// Pricing information (BRL)
#[derive(Clone, Debug)]
pub struct PlanPricing {
    pub title: String,
    pub description: String,
    pub amount: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_codes_round_trip() {
        for plan in [
            PurchasePlan::SingleCredit,
            PurchasePlan::CreditPack,
            PurchasePlan::MonthlySubscription,
            PurchasePlan::AnnualSubscription,
        ] {
            assert_eq!(PurchasePlan::parse(plan.as_str()).unwrap(), plan);
        }
    }

    #[test]
    fn test_unknown_plan_is_an_error() {
        assert!(PurchasePlan::parse("lifetime").is_err());
    }

    #[test]
    fn test_credit_grants() {
        assert_eq!(PurchasePlan::SingleCredit.grant(), Grant::Credits(1));
        assert_eq!(PurchasePlan::CreditPack.grant(), Grant::Credits(5));
    }

    #[test]
    fn test_subscription_grants() {
        assert_eq!(
            PurchasePlan::MonthlySubscription.grant(),
            Grant::Subscription(SubscriptionTier::Monthly)
        );
        assert_eq!(
            PurchasePlan::AnnualSubscription.grant(),
            Grant::Subscription(SubscriptionTier::Annual)
        );
    }

    #[test]
    fn test_pricing() {
        assert_eq!(PurchasePlan::SingleCredit.pricing().amount, dec!(19.90));
        assert_eq!(PurchasePlan::AnnualSubscription.pricing().amount, dec!(299.00));
    }
}
