/// Column-name constants for the turno-riego tables.
/// Single source of truth - exported to Python via PyO3.

// ── Parcel registry (padrón) ────────────────────────────────────────────────
pub mod padron {
    pub const PARCEL_ID: &str = "idPadron";
    pub const CANAL: &str = "orden_cauce";
    pub const SUBGROUP: &str = "Subgrupo";
    pub const GROUP: &str = "Grupo";
    pub const REGISTERED_AREA: &str = "sup_emp_reducida";
    pub const HA_SI: &str = "ha_si";
    pub const TPO_REC_TOMA: &str = "tpo_rec_toma";
    pub const TPO_REC_CABEZA_COLA: &str = "tpo_rec_cabeza_cola";
    pub const TPO_REC_COLA_CABEZA: &str = "tpo_rec_cola_cabeza";
    pub const TPO_DESCUELGUE: &str = "tpo_descuelgue";
    pub const CC: &str = "CC";
    pub const PP: &str = "PP";
    pub const NETWORK_ID: &str = "id_inspeccion";

    pub const REQUIRED: [&str; 5] = [PARCEL_ID, CANAL, SUBGROUP, GROUP, REGISTERED_AREA];

    pub const TRANSIT: [&str; 4] = [
        TPO_REC_TOMA,
        TPO_REC_CABEZA_COLA,
        TPO_REC_COLA_CABEZA,
        TPO_DESCUELGUE,
    ];
}

// ── Irrigation requests (solicitud) ─────────────────────────────────────────
pub mod solicitud {
    pub const PARCEL_ID: &str = "idPadron";
    pub const SUP_AD: &str = "sup_ad";
    pub const SUP_RES: &str = "sup_res";
    pub const SUP_REC: &str = "sup_rec";
    pub const SUP_CED: &str = "sup_ced";
    pub const HA_ACTIVA: &str = "ha_activa";

    pub const ADJUSTMENTS: [&str; 4] = [SUP_AD, SUP_RES, SUP_REC, SUP_CED];
}

// ── Reinforcement sources (refuerzos) ───────────────────────────────────────
pub mod refuerzo {
    pub const FLOW: &str = "caudal_refuerzo";
    pub const DURATION: &str = "dur_refuerzo";
    pub const NETWORK_ID: &str = "id_inspeccion";
}

// ── Reservoirs (reservorio) ─────────────────────────────────────────────────
pub mod reservorio {
    pub const VOLUME: &str = "volumen";
    pub const NETWORK_ID: &str = "id_inspeccion";
}

// ── Mode matrix (modos) ─────────────────────────────────────────────────────
pub mod modos {
    pub const CANAL: &str = "orden_cauce";
    pub const PRIORITY: &str = "cabeza_cola";
    pub const SUBGROUP_MODE: &str = "subgrupo";
    pub const GROUP_MODE: &str = "grupo";
}

// ── Delivery-priority labels ────────────────────────────────────────────────
pub mod priority {
    pub const HEAD: [&str; 2] = ["cabeza", "head"];
    pub const TAIL: [&str; 2] = ["cola", "tail"];
}

// ── Turn table frame (Python side) ──────────────────────────────────────────
pub mod turn_frame {
    pub const CANAL: &str = "orden_cauce";
    pub const PARCEL_ID: &str = "id_parcela";
    pub const CC: &str = "CC";
    pub const PP: &str = "PP";
    pub const FLOW: &str = "caudal";
    pub const VOLUME: &str = "volumen";
    pub const DURATION_H: &str = "tiempo_h";
    pub const START: &str = "inicio";
    pub const END: &str = "fin";
}
