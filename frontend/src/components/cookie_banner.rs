use std::ops::Deref;
use std::rc::Rc;

use gloo_timers::callback::Timeout;
use log::{info, warn};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;
use web_sys::{window, Element, Event, HtmlElement, HtmlInputElement, KeyboardEvent, MouseEvent, Node};
use yew::prelude::*;

use crate::config;
use crate::consent::{Category, ConsentChoice, ConsentStore};

const BANNER_HIDE_DELAY_MS: u32 = 300; // matches the CSS slide-out transition
const MODAL_FOCUS_DELAY_MS: u32 = 100;
const FOOTER_SETTINGS_ID: &str = "footer-cookie-settings";
const FOCUSABLE: &str = "button, input:not(:disabled), [tabindex]:not([tabindex=\"-1\"])";

/// Shared store handle usable as a prop (compares by identity).
#[derive(Clone)]
pub struct ConsentHandle(Rc<ConsentStore>);

impl ConsentHandle {
    pub fn new(store: Rc<ConsentStore>) -> Self {
        Self(store)
    }
}

impl Deref for ConsentHandle {
    type Target = ConsentStore;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PartialEq for ConsentHandle {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Properties, PartialEq)]
pub struct CookieConsentProps {
    pub store: ConsentHandle,
    /// Whether the banner should be showing.
    pub open: bool,
    pub on_open_change: Callback<bool>,
}

#[function_component(CookieConsent)]
pub fn cookie_consent(props: &CookieConsentProps) -> Html {
    let displayed = use_state(|| props.open);
    let modal_open = use_state(|| false);
    let analytics = use_state(|| false);
    let marketing = use_state(|| false);
    let error = use_state(|| None::<String>);
    let modal_ref = use_node_ref();

    // Keep the banner in the layout until its hide transition has finished
    {
        let displayed = displayed.clone();
        use_effect_with_deps(
            move |open: &bool| {
                let timeout = if *open {
                    displayed.set(true);
                    None
                } else {
                    Some(Timeout::new(BANNER_HIDE_DELAY_MS, move || displayed.set(false)))
                };
                move || drop(timeout)
            },
            props.open,
        );
    }

    // Focus the first editable checkbox once the modal is open
    {
        let modal_ref = modal_ref.clone();
        use_effect_with_deps(
            move |open: &bool| {
                let timeout = open.then(|| {
                    Timeout::new(MODAL_FOCUS_DELAY_MS, move || {
                        let checkbox = modal_ref
                            .cast::<Element>()
                            .and_then(|modal| {
                                modal
                                    .query_selector("input[type=\"checkbox\"]:not(:disabled)")
                                    .ok()
                                    .flatten()
                            })
                            .and_then(|el| el.dyn_into::<HtmlElement>().ok());
                        if let Some(checkbox) = checkbox {
                            let _ = checkbox.focus();
                        }
                    })
                });
                move || drop(timeout)
            },
            *modal_open,
        );
    }

    // Document-level keys: Escape closes the modal, dev shortcuts reset/inspect consent
    {
        let modal_open = modal_open.clone();
        let store = props.store.clone();
        let on_open_change = props.on_open_change.clone();
        use_effect_with_deps(
            move |_| {
                let document = window().and_then(|w| w.document());
                let keydown = Closure::wrap(Box::new(move |e: KeyboardEvent| {
                    if e.key() == "Escape" {
                        modal_open.set(false);
                        return;
                    }
                    if !config::debug_shortcuts_enabled() {
                        return;
                    }
                    let typing = e
                        .target()
                        .and_then(|t| t.dyn_into::<HtmlInputElement>().ok())
                        .is_some();
                    if typing {
                        return;
                    }
                    match e.key().as_str() {
                        "c" => match store.clear() {
                            Ok(()) => on_open_change.emit(true),
                            Err(e) => warn!("Failed to clear cookie consent: {}", e),
                        },
                        "p" => match store.load() {
                            Some(record) => info!("Current cookie preferences: {:?}", record),
                            None => info!("No cookie preferences set"),
                        },
                        _ => {}
                    }
                }) as Box<dyn FnMut(KeyboardEvent)>);

                if let Some(document) = document.as_ref() {
                    let _ = document
                        .add_event_listener_with_callback("keydown", keydown.as_ref().unchecked_ref());
                }

                move || {
                    if let Some(document) = document {
                        let _ = document.remove_event_listener_with_callback(
                            "keydown",
                            keydown.as_ref().unchecked_ref(),
                        );
                    }
                }
            },
            (),
        );
    }

    // The static page footer carries a "Cookie settings" link outside this component
    {
        let on_open_change = props.on_open_change.clone();
        use_effect_with_deps(
            move |_| {
                let link = window()
                    .and_then(|w| w.document())
                    .and_then(|d| d.get_element_by_id(FOOTER_SETTINGS_ID));
                let click = Closure::wrap(Box::new(move |e: MouseEvent| {
                    e.prevent_default();
                    on_open_change.emit(true);
                }) as Box<dyn FnMut(MouseEvent)>);

                if let Some(link) = link.as_ref() {
                    let _ = link.add_event_listener_with_callback("click", click.as_ref().unchecked_ref());
                }

                move || {
                    if let Some(link) = link {
                        let _ = link.remove_event_listener_with_callback(
                            "click",
                            click.as_ref().unchecked_ref(),
                        );
                    }
                }
            },
            (),
        );
    }

    let save = {
        let store = props.store.clone();
        let on_open_change = props.on_open_change.clone();
        let modal_open = modal_open.clone();
        let error = error.clone();
        Callback::from(move |choice: ConsentChoice| match store.save(choice) {
            Ok(_) => {
                error.set(None);
                modal_open.set(false);
                on_open_change.emit(false);
            }
            Err(e) => {
                error.set(Some(format!(
                    "We couldn't save your cookie preferences ({}). Please try again.",
                    e
                )));
            }
        })
    };

    let accept_all = {
        let save = save.clone();
        Callback::from(move |_: MouseEvent| save.emit(ConsentChoice::accept_all()))
    };

    let reject_all = {
        let save = save.clone();
        Callback::from(move |_: MouseEvent| save.emit(ConsentChoice::reject_all()))
    };

    let save_custom = {
        let save = save.clone();
        let analytics = analytics.clone();
        let marketing = marketing.clone();
        Callback::from(move |_: MouseEvent| {
            save.emit(ConsentChoice::custom(*analytics, *marketing))
        })
    };

    let open_settings = {
        let store = props.store.clone();
        let modal_open = modal_open.clone();
        let analytics = analytics.clone();
        let marketing = marketing.clone();
        Callback::from(move |_: MouseEvent| {
            let choice = store.current().map(|r| r.choice()).unwrap_or_default();
            analytics.set(choice.analytics);
            marketing.set(choice.marketing);
            modal_open.set(true);
        })
    };

    let close_settings = {
        let modal_open = modal_open.clone();
        Callback::from(move |_: MouseEvent| modal_open.set(false))
    };

    // Keep Tab / Shift+Tab cycling inside the open modal
    let trap_focus = {
        let modal_ref = modal_ref.clone();
        let open = *modal_open;
        Callback::from(move |e: KeyboardEvent| {
            if e.key() != "Tab" || !open {
                return;
            }
            let Some(modal) = modal_ref.cast::<Element>() else {
                return;
            };
            let Ok(focusable) = modal.query_selector_all(FOCUSABLE) else {
                return;
            };
            let count = focusable.length();
            if count == 0 {
                return;
            }
            let first = focusable.get(0).and_then(|n| n.dyn_into::<HtmlElement>().ok());
            let last = focusable.get(count - 1).and_then(|n| n.dyn_into::<HtmlElement>().ok());
            let (Some(first), Some(last)) = (first, last) else {
                return;
            };
            let Some(active) = window()
                .and_then(|w| w.document())
                .and_then(|d| d.active_element())
            else {
                return;
            };

            let first_node: &Node = first.as_ref();
            let last_node: &Node = last.as_ref();
            if e.shift_key() && active.is_same_node(Some(first_node)) {
                e.prevent_default();
                let _ = last.focus();
            } else if !e.shift_key() && active.is_same_node(Some(last_node)) {
                e.prevent_default();
                let _ = first.focus();
            }
        })
    };

    let toggle = |state: &UseStateHandle<bool>| {
        let state = state.clone();
        Callback::from(move |e: Event| {
            let input: HtmlInputElement = e.target_unchecked_into();
            state.set(input.checked());
        })
    };

    let category_row = |category: Category, checked: bool, onchange: Option<Callback<Event>>| {
        let (name, description) = config::category_label(category);
        let id = format!("cookie-cat-{}", category);
        html! {
            <div class="cookie-category">
                <label class="cookie-category__label">
                    <input
                        type="checkbox"
                        id={id}
                        checked={checked}
                        disabled={category.is_required()}
                        onchange={onchange}
                    />
                    <span class="cookie-category__name">{name}</span>
                </label>
                <p class="cookie-category__description">{description}</p>
            </div>
        }
    };

    html! {
        <>
            <div
                id="cookie-banner"
                class={classes!("cookie-banner", props.open.then(|| "cookie-banner--visible"))}
                style={(!*displayed).then(|| "display: none")}
                role="region"
                aria-label="Cookie consent"
            >
                <div class="cookie-banner__content">
                    <p class="cookie-banner__text">
                        {"We use cookies to keep this site working and, with your permission, to understand how it is used and to measure our marketing."}
                    </p>
                    {
                        if let Some(message) = (*error).as_ref() {
                            html! { <p class="cookie-banner__error" role="alert">{message}</p> }
                        } else {
                            html! {}
                        }
                    }
                    <div class="cookie-banner__actions">
                        <button id="cookie-reject-all" class="button button--secondary" onclick={reject_all.clone()}>
                            {"Reject all"}
                        </button>
                        <button id="cookie-settings-btn" class="button button--secondary" onclick={open_settings}>
                            {"Settings"}
                        </button>
                        <button id="cookie-accept-all" class="button button--primary" onclick={accept_all}>
                            {"Accept all"}
                        </button>
                    </div>
                </div>
            </div>

            <div
                id="cookie-modal"
                class={classes!("cookie-modal", (*modal_open).then(|| "cookie-modal--visible"))}
                role="dialog"
                aria-modal="true"
                aria-labelledby="cookie-modal-title"
                ref={modal_ref}
                onkeydown={trap_focus}
            >
                <div class="cookie-modal__content">
                    <div class="cookie-modal__header">
                        <h2 id="cookie-modal-title">{"Cookie settings"}</h2>
                        <button id="cookie-modal-close" class="cookie-modal__close" aria-label="Close" onclick={close_settings}>
                            {"×"}
                        </button>
                    </div>
                    { category_row(Category::Essential, true, None) }
                    { category_row(Category::Analytics, *analytics, Some(toggle(&analytics))) }
                    { category_row(Category::Marketing, *marketing, Some(toggle(&marketing))) }
                    <div class="cookie-modal__actions">
                        <button id="cookie-modal-reject" class="button button--secondary" onclick={reject_all}>
                            {"Reject all"}
                        </button>
                        <button id="cookie-modal-save" class="button button--primary" onclick={save_custom}>
                            {"Save preferences"}
                        </button>
                    </div>
                </div>
            </div>
        </>
    }
}
