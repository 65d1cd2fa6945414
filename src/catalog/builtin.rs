//! Built-in variable tables for the supported models.
//!
//! These are the static catalog data loaded once at startup. Canonical names
//! are provider-independent: the same physical field gets the same outname
//! from every source, which is what makes the local archive uniform.

use std::sync::LazyLock;

use super::{VariableCatalog, VariableKey};

fn v(name: &str, level_type: &str, level: &str) -> VariableKey {
    VariableKey::new(name, level_type, level)
}

/// ECCC GEPS ensemble fields (GRIB shortname, GRIB level type, level).
pub static ECCC_GEPS_ENS_VARIABLES: LazyLock<VariableCatalog> = LazyLock::new(|| {
    VariableCatalog::from_entries([
        (v("TMP", "TGL", "2m"), "TMP_L0"),
        (v("TMP", "TGL", "40"), "TMP_M40"),
        (v("TMP", "TGL", "80"), "TMP_M80"),
        (v("TMP", "TGL", "120"), "TMP_M120"),
        (v("RH", "TGL", "2m"), "RHU_L0"),
        (v("SPFH", "TGL", "2"), "SPFH_L0"),
        (v("UGRD", "TGL", "10m"), "U_M10"),
        (v("VGRD", "TGL", "10m"), "V_M10"),
        (v("WIND", "TGL", "10"), "WIND_M10"),
        (v("WIND", "TGL", "40"), "WIND_M40"),
        (v("WIND", "TGL", "80"), "WIND_M80"),
        (v("WIND", "TGL", "120"), "WIND_M120"),
        (v("APCP", "SFC", "0"), "TP_L0"),
        (v("ASNOW", "SFC", "0"), "ASNOW_L0"),
        (v("CAPE", "SFC", "0"), "CAPE_L0"),
        (v("CIN", "SFC", "0"), "CIN_L0"),
        (v("DSWRF", "SFC", "0"), "DSWRF_L0"),
        (v("DLWRF", "SFC", "0"), "DLWRF_L0"),
        (v("PRES", "SFC", "0"), "PRES_L0"),
        (v("SNOD", "SFC", "0"), "SNOD_L0"),
        (v("TCDC", "SFC", "0"), "TCC_L0"),
        (v("PRMSL", "MSL", "0"), "PRMSL_S0"),
        (v("PWAT", "EATM", "0"), "PWAT_L0"),
        (v("HGT", "ISBL", "0500"), "HGT_P500"),
        (v("TMP", "ISBL", "0500"), "TMP_P500"),
        (v("RH", "ISBL", "0500"), "RHU_P500"),
        (v("UGRD", "ISBL", "0500"), "U_P500"),
        (v("VGRD", "ISBL", "0500"), "V_P500"),
        (v("HGT", "ISBL", "0700"), "HGT_P700"),
        (v("TMP", "ISBL", "0700"), "TMP_P700"),
        (v("UGRD", "ISBL", "0700"), "U_P700"),
        (v("VGRD", "ISBL", "0700"), "V_P700"),
        (v("HGT", "ISBL", "0850"), "HGT_P850"),
        (v("TMP", "ISBL", "0850"), "TMP_P850"),
        (v("RH", "ISBL", "0850"), "RHU_P850"),
        (v("UGRD", "ISBL", "0850"), "U_P850"),
        (v("VGRD", "ISBL", "0850"), "V_P850"),
        (v("VVEL", "ISBL", "0850"), "VVEL_P850"),
        (v("HGT", "ISBL", "0925"), "HGT_P925"),
        (v("TMP", "ISBL", "0925"), "TMP_P925"),
        (v("HGT", "ISBL", "1000"), "HGT_P1000"),
        (v("TMP", "ISBL", "1000"), "TMP_P1000"),
        (v("UGRD", "ISBL", "1000"), "U_P1000"),
        (v("VGRD", "ISBL", "1000"), "V_P1000"),
    ])
});

/// ECMWF open-data fields (MARS param, levtype, levelist).
///
/// Surface params carry their implied level after the index fixups
/// (`2t` → 2, `10u`/`10v` → 10, everything else without a levelist → 0).
pub static ECMWF_ENFO_VARIABLES: LazyLock<VariableCatalog> = LazyLock::new(|| {
    VariableCatalog::from_entries([
        (v("2t", "sfc", "2"), "TMP_L0"),
        (v("10u", "sfc", "10"), "U_M10"),
        (v("10v", "sfc", "10"), "V_M10"),
        (v("tp", "sfc", "0"), "TP_L0"),
        (v("msl", "sfc", "0"), "PRMSL_S0"),
        (v("sp", "sfc", "0"), "PRES_L0"),
        (v("tcwv", "sfc", "0"), "PWAT_L0"),
        (v("gh", "pl", "500"), "HGT_P500"),
        (v("t", "pl", "500"), "TMP_P500"),
        (v("r", "pl", "500"), "RHU_P500"),
        (v("u", "pl", "500"), "U_P500"),
        (v("v", "pl", "500"), "V_P500"),
        (v("gh", "pl", "700"), "HGT_P700"),
        (v("t", "pl", "700"), "TMP_P700"),
        (v("u", "pl", "700"), "U_P700"),
        (v("v", "pl", "700"), "V_P700"),
        (v("gh", "pl", "850"), "HGT_P850"),
        (v("t", "pl", "850"), "TMP_P850"),
        (v("r", "pl", "850"), "RHU_P850"),
        (v("u", "pl", "850"), "U_P850"),
        (v("v", "pl", "850"), "V_P850"),
        (v("gh", "pl", "925"), "HGT_P925"),
        (v("t", "pl", "925"), "TMP_P925"),
        (v("gh", "pl", "1000"), "HGT_P1000"),
        (v("t", "pl", "1000"), "TMP_P1000"),
        (v("u", "pl", "1000"), "U_P1000"),
        (v("v", "pl", "1000"), "V_P1000"),
    ])
});

/// DWD ICON global fields (filename field id, level kind, level).
pub static DWD_ICON_VARIABLES: LazyLock<VariableCatalog> = LazyLock::new(|| {
    VariableCatalog::from_entries([
        (v("T", "single", "2"), "TMP_L0"),
        (v("TD", "single", "2"), "DPT_L0"),
        (v("U", "single", "10"), "U_M10"),
        (v("V", "single", "10"), "V_M10"),
        (v("TOT_PREC", "single", "0"), "TP_L0"),
        (v("PMSL", "single", "0"), "PRMSL_S0"),
        (v("PS", "single", "0"), "PRES_L0"),
        (v("CLCT", "single", "0"), "TCC_L0"),
        (v("CAPE_CON", "single", "0"), "CAPE_L0"),
        (v("H_SNOW", "single", "0"), "SNOD_L0"),
        (v("ASOB_S", "single", "0"), "DSWRF_L0"),
        (v("FI", "pressure", "500"), "HGT_P500"),
        (v("T", "pressure", "500"), "TMP_P500"),
        (v("RELHUM", "pressure", "500"), "RHU_P500"),
        (v("U", "pressure", "500"), "U_P500"),
        (v("V", "pressure", "500"), "V_P500"),
        (v("FI", "pressure", "700"), "HGT_P700"),
        (v("T", "pressure", "700"), "TMP_P700"),
        (v("U", "pressure", "700"), "U_P700"),
        (v("V", "pressure", "700"), "V_P700"),
        (v("FI", "pressure", "850"), "HGT_P850"),
        (v("T", "pressure", "850"), "TMP_P850"),
        (v("RELHUM", "pressure", "850"), "RHU_P850"),
        (v("U", "pressure", "850"), "U_P850"),
        (v("V", "pressure", "850"), "V_P850"),
    ])
});
